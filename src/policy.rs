// ⚙️ Scoring Policy - every tunable coefficient in one place
//
// The weights and thresholds are product policy, not structure. They load from JSON so
// a reviewer can change a coefficient without touching scoring code.

use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PolicyError {
    #[error("{table} weights sum to {sum}, expected 100")]
    WeightsDoNotSumTo100 { table: &'static str, sum: u32 },
    #[error("{field} must be within {min}..={max}, found {found}")]
    OutOfRange {
        field: &'static str,
        min: f64,
        max: f64,
        found: f64,
    },
    #[error("risk bands must satisfy 100 >= low > medium > high > 0")]
    UnorderedRiskBands,
    #[error("evidence and anomaly duplicate rules disagree (group size and window must match)")]
    InconsistentDuplicateRule,
    #[error("known seasonal month {0} is not a calendar month")]
    InvalidSeasonalMonth(u32),
}

// ============================================================================
// SCORING POLICY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ScoringPolicy {
    pub anomaly: AnomalyPolicy,
    pub reconciliation: ReconciliationPolicy,
    pub evidence: EvidencePolicy,
    pub stability: StabilityPolicy,
    pub compliance: CompliancePolicy,
    pub tier: TierPolicy,
    pub composite: CompositePolicy,
}

impl ScoringPolicy {
    /// Load policy from JSON file; missing sections fall back to defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read policy file: {:?}", path.as_ref()))?;

        let policy: ScoringPolicy =
            serde_json::from_str(&content).context("Failed to parse policy JSON")?;

        policy.validate().context("Policy file failed validation")?;

        Ok(policy)
    }

    pub fn validate(&self) -> std::result::Result<(), PolicyError> {
        let e = &self.evidence.weights;
        check_weights(
            "evidence",
            &[e.document_backed, e.consistency, e.continuity, e.metadata],
        )?;

        let s = &self.stability.weights;
        check_weights(
            "stability",
            &[
                s.revenue_stability,
                s.cashflow_health,
                s.expense_discipline,
                s.growth_trend,
                s.seasonality,
            ],
        )?;

        let c = &self.compliance.weights;
        check_weights(
            "compliance",
            &[c.vat_evidence, c.tax_documents, c.tax_provisioning, c.filing_timeliness],
        )?;

        let w = &self.composite.weights;
        check_weights("composite", &[w.evidence, w.stability, w.compliance])?;

        let r = &self.reconciliation;
        check_weights("reconciliation", &[r.invoice_weight, r.receipt_weight])?;
        check_range("reconciliation.tolerance", r.tolerance, 0.0, 1.0)?;
        check_range(
            "reconciliation.minor_mismatch_limit",
            r.minor_mismatch_limit,
            r.tolerance,
            1.0,
        )?;

        let a = &self.anomaly;
        check_range("anomaly.spike_k", a.spike_k, 0.5, 10.0)?;
        check_range("anomaly.round_fraction", a.round_fraction, 0.0, 1.0)?;
        check_range(
            "anomaly.round_high_fraction",
            a.round_high_fraction,
            a.round_fraction,
            1.0,
        )?;
        check_range(
            "anomaly.duplicate_group_size",
            a.duplicate_group_size as f64,
            2.0,
            100.0,
        )?;

        let ev = &self.evidence;
        if ev.duplicate_group_size != a.duplicate_group_size
            || ev.duplicate_window_days != a.duplicate_window_days
        {
            return Err(PolicyError::InconsistentDuplicateRule);
        }

        check_range(
            "stability.positive_month_target",
            self.stability.positive_month_target,
            0.01,
            1.0,
        )?;
        for month in &self.stability.known_seasonal_months {
            if !(1..=12).contains(month) {
                return Err(PolicyError::InvalidSeasonalMonth(*month));
            }
        }

        let bands = &self.compliance.risk_bands;
        if !(bands.low <= 100 && bands.low > bands.medium && bands.medium > bands.high && bands.high > 0)
        {
            return Err(PolicyError::UnorderedRiskBands);
        }

        check_range(
            "tier.min_document_backed_ratio",
            self.tier.min_document_backed_ratio as f64,
            1.0,
            100.0,
        )?;

        Ok(())
    }
}

fn check_weights(table: &'static str, weights: &[u8]) -> std::result::Result<(), PolicyError> {
    let sum: u32 = weights.iter().map(|w| *w as u32).sum();
    if sum != 100 {
        return Err(PolicyError::WeightsDoNotSumTo100 { table, sum });
    }
    Ok(())
}

fn check_range(
    field: &'static str,
    found: f64,
    min: f64,
    max: f64,
) -> std::result::Result<(), PolicyError> {
    if !found.is_finite() || found < min || found > max {
        return Err(PolicyError::OutOfRange {
            field,
            min,
            max,
            found,
        });
    }
    Ok(())
}

// ============================================================================
// ANOMALY DETECTION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyPolicy {
    /// Spike threshold: mean + k * stddev of the trailing window
    pub spike_k: f64,
    /// Number of prior same-direction transactions in the trailing window
    pub spike_window: usize,
    /// Fewer prior transactions than this and no spike is evaluated
    pub spike_min_window: usize,

    /// A "round" amount is a multiple of this many minor units
    pub round_unit: i64,
    pub round_fraction: f64,
    pub round_high_fraction: f64,
    pub round_min_sample: usize,

    pub duplicate_group_size: usize,
    pub duplicate_high_group_size: usize,
    pub duplicate_window_days: i64,

    /// Month flagged when its count reaches multiplier x the median month
    pub frequency_multiplier: f64,
    pub frequency_min_months: usize,
    pub frequency_min_count: usize,

    pub low_reduction: u32,
    pub medium_reduction: u32,
    pub high_reduction: u32,
}

impl Default for AnomalyPolicy {
    fn default() -> Self {
        AnomalyPolicy {
            spike_k: 3.0,
            spike_window: 12,
            spike_min_window: 5,
            round_unit: 100_000,
            round_fraction: 0.40,
            round_high_fraction: 0.70,
            round_min_sample: 10,
            duplicate_group_size: 3,
            duplicate_high_group_size: 5,
            duplicate_window_days: 3,
            frequency_multiplier: 3.0,
            frequency_min_months: 4,
            frequency_min_count: 8,
            low_reduction: 2,
            medium_reduction: 5,
            high_reduction: 10,
        }
    }
}

// ============================================================================
// RECONCILIATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationPolicy {
    /// Relative delta below which two totals match
    pub tolerance: f64,
    /// Mismatches below this delta count as minor for confidence purposes
    pub minor_mismatch_limit: f64,
    /// Importance of invoices vs bank deposits
    pub invoice_weight: u8,
    /// Importance of receipts vs bank payments
    pub receipt_weight: u8,
}

impl Default for ReconciliationPolicy {
    fn default() -> Self {
        ReconciliationPolicy {
            tolerance: 0.10,
            minor_mismatch_limit: 0.25,
            invoice_weight: 60,
            receipt_weight: 40,
        }
    }
}

// ============================================================================
// EVIDENCE QUALITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidenceWeights {
    pub document_backed: u8,
    pub consistency: u8,
    pub continuity: u8,
    pub metadata: u8,
}

impl Default for EvidenceWeights {
    fn default() -> Self {
        EvidenceWeights {
            document_backed: 60,
            consistency: 20,
            continuity: 15,
            metadata: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidencePolicy {
    pub weights: EvidenceWeights,
    /// Same rule as `anomaly.duplicate_window_days` / `anomaly.duplicate_group_size`
    pub duplicate_window_days: i64,
    pub duplicate_group_size: usize,
    /// Consistency points lost per surplus duplicate entry
    pub duplicate_penalty: u32,
    /// Consistency points lost per conflicting document pair
    pub conflict_penalty: u32,
    pub duplicate_flag_impact: i32,
    pub conflict_flag_impact: i32,
    pub zero_evidence_impact: i32,
    /// Gaps shorter than this many months are tolerated without a flag
    pub gap_flag_months: usize,
    pub gap_impact_per_month: i32,
    pub strong_backing_ratio: u8,
}

impl Default for EvidencePolicy {
    fn default() -> Self {
        EvidencePolicy {
            weights: EvidenceWeights::default(),
            duplicate_window_days: 3,
            duplicate_group_size: 3,
            duplicate_penalty: 10,
            conflict_penalty: 15,
            duplicate_flag_impact: -3,
            conflict_flag_impact: -5,
            zero_evidence_impact: -10,
            gap_flag_months: 2,
            gap_impact_per_month: -1,
            strong_backing_ratio: 80,
        }
    }
}

// ============================================================================
// STABILITY & GROWTH
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityWeights {
    pub revenue_stability: u8,
    pub cashflow_health: u8,
    pub expense_discipline: u8,
    pub growth_trend: u8,
    pub seasonality: u8,
}

impl Default for StabilityWeights {
    fn default() -> Self {
        StabilityWeights {
            revenue_stability: 25,
            cashflow_health: 25,
            expense_discipline: 20,
            growth_trend: 20,
            seasonality: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityPolicy {
    pub weights: StabilityWeights,
    /// Share of months with non-negative net cashflow that earns full marks
    pub positive_month_target: f64,
    /// Expense/revenue ratio at or below this scores 100
    pub expense_ratio_floor: f64,
    /// Expense/revenue ratio at or above this scores 0
    pub expense_ratio_ceiling: f64,
    /// Points lost per unit of monthly ratio increase
    pub rising_ratio_penalty: f64,
    pub max_rising_ratio_penalty: f64,
    pub min_months_for_trend: usize,
    /// A month below (1 - threshold) x mean revenue is a dip
    pub seasonal_dip_threshold: f64,
    /// Calendar months (1-12) with a known, explainable slowdown
    pub known_seasonal_months: Vec<u32>,
    pub warning_flag_impact: i32,
    pub critical_flag_impact: i32,
}

impl Default for StabilityPolicy {
    fn default() -> Self {
        StabilityPolicy {
            weights: StabilityWeights::default(),
            positive_month_target: 0.75,
            expense_ratio_floor: 0.5,
            expense_ratio_ceiling: 1.2,
            rising_ratio_penalty: 400.0,
            max_rising_ratio_penalty: 40.0,
            min_months_for_trend: 3,
            seasonal_dip_threshold: 0.25,
            known_seasonal_months: Vec::new(),
            warning_flag_impact: -2,
            critical_flag_impact: -5,
        }
    }
}

// ============================================================================
// COMPLIANCE READINESS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplianceWeights {
    pub vat_evidence: u8,
    pub tax_documents: u8,
    pub tax_provisioning: u8,
    pub filing_timeliness: u8,
}

impl Default for ComplianceWeights {
    fn default() -> Self {
        ComplianceWeights {
            vat_evidence: 30,
            tax_documents: 25,
            tax_provisioning: 25,
            filing_timeliness: 20,
        }
    }
}

/// Lower bounds of each risk level; below `high` is critical
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskBands {
    pub low: u8,
    pub medium: u8,
    pub high: u8,
}

impl Default for RiskBands {
    fn default() -> Self {
        RiskBands {
            low: 80,
            medium: 60,
            high: 40,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompliancePolicy {
    pub weights: ComplianceWeights,
    pub risk_bands: RiskBands,
    /// Annual statements older than this are overdue (12 months + filing grace)
    pub statement_max_age_days: i64,
    /// Timeliness credit for an overdue but not abandoned statement
    pub stale_statement_credit: u8,
    pub missing_filing_impact: i32,
    pub overdue_filing_impact: i32,
}

impl Default for CompliancePolicy {
    fn default() -> Self {
        CompliancePolicy {
            weights: ComplianceWeights::default(),
            risk_bands: RiskBands::default(),
            statement_max_age_days: 455,
            stale_statement_credit: 50,
            missing_filing_impact: -3,
            overdue_filing_impact: -3,
        }
    }
}

// ============================================================================
// TRUST TIERS & COMPOSITE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierPolicy {
    pub min_document_backed_ratio: u8,
    pub min_bank_transactions: usize,
}

impl Default for TierPolicy {
    fn default() -> Self {
        TierPolicy {
            min_document_backed_ratio: 50,
            min_bank_transactions: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeWeights {
    pub evidence: u8,
    pub stability: u8,
    pub compliance: u8,
}

impl Default for CompositeWeights {
    fn default() -> Self {
        CompositeWeights {
            evidence: 40,
            stability: 35,
            compliance: 25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositePolicy {
    pub weights: CompositeWeights,
    /// Upper bound on the total anomaly deduction
    pub max_anomaly_reduction: u32,
    /// Factors scoring below this carry an improvement suggestion
    pub suggest_below: u8,
    pub max_actions: usize,
}

impl Default for CompositePolicy {
    fn default() -> Self {
        CompositePolicy {
            weights: CompositeWeights::default(),
            max_anomaly_reduction: 30,
            suggest_below: 80,
            max_actions: 8,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_policy_is_valid() {
        assert_eq!(ScoringPolicy::default().validate(), Ok(()));
    }

    #[test]
    fn test_rejects_weights_not_summing_to_100() {
        let mut policy = ScoringPolicy::default();
        policy.evidence.weights.metadata = 10;

        assert_eq!(
            policy.validate(),
            Err(PolicyError::WeightsDoNotSumTo100 {
                table: "evidence",
                sum: 105
            })
        );
    }

    #[test]
    fn test_rejects_diverging_duplicate_rules() {
        let mut policy = ScoringPolicy::default();
        policy.evidence.duplicate_group_size = 2;

        assert_eq!(policy.validate(), Err(PolicyError::InconsistentDuplicateRule));
    }

    #[test]
    fn test_rejects_unordered_risk_bands() {
        let mut policy = ScoringPolicy::default();
        policy.compliance.risk_bands.medium = 85;

        assert_eq!(policy.validate(), Err(PolicyError::UnorderedRiskBands));
    }

    #[test]
    fn test_rejects_invalid_seasonal_month() {
        let mut policy = ScoringPolicy::default();
        policy.stability.known_seasonal_months = vec![8, 13];

        assert_eq!(policy.validate(), Err(PolicyError::InvalidSeasonalMonth(13)));
    }

    #[test]
    fn test_from_file_merges_partial_policy_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "composite": {{ "weights": {{ "evidence": 50, "stability": 30, "compliance": 20 }} }} }}"#
        )
        .unwrap();

        let policy = ScoringPolicy::from_file(file.path()).unwrap();

        assert_eq!(policy.composite.weights.evidence, 50);
        assert_eq!(policy.composite.max_anomaly_reduction, 30);
        assert_eq!(policy.anomaly, AnomalyPolicy::default());
    }

    #[test]
    fn test_from_file_rejects_invalid_weights() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "composite": {{ "weights": {{ "evidence": 50, "stability": 50, "compliance": 50 }} }} }}"#
        )
        .unwrap();

        let err = ScoringPolicy::from_file(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("composite weights sum to 150"));
    }
}
