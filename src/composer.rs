// 🏦 Credibility Score Composer - one deterministic score per record snapshot
//
// total = clamp(evidence x 0.40 + stability x 0.35 + compliance x 0.25
//               - min(sum of anomaly reductions, cap), 0, 100)
//
// The engine holds policy only. Every call is a full recomputation over the snapshot
// it is given, so the same snapshot always produces the same score.

use crate::anomaly::{AnomalyDetector, AnomalyFinding, AnomalyType, Severity};
use crate::compliance::{ComplianceAssessment, ComplianceScorer};
use crate::evidence::EvidenceScorer;
use crate::layer::{ActionCategory, Effort, LayerScore};
use crate::policy::ScoringPolicy;
use crate::reconciliation::{CrossSourceReconciler, ReconciliationResult};
use crate::records::{snapshot_digest, NormalizedRecord};
use crate::stability::StabilityScorer;
use crate::tier::{RequirementKey, TierEvidence, TierRequirement, TrustTierClassifier, TrustTierInfo};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// OUTPUT MODEL
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConfidenceLevel::High => "high",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::Low => "low",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Immediate,
    ShortTerm,
    MediumTerm,
}

impl Priority {
    /// Missing evidence first, stability next, compliance gaps last
    pub fn for_category(category: ActionCategory) -> Self {
        match category {
            ActionCategory::Evidence => Priority::Immediate,
            ActionCategory::Stability => Priority::ShortTerm,
            ActionCategory::Compliance => Priority::MediumTerm,
            ActionCategory::Verification => Priority::ShortTerm,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImprovementAction {
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub category: ActionCategory,
    pub effort: Effort,
    /// Estimated total-score points recoverable
    pub potential_gain: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredibilityScore {
    pub total_score: u8,
    pub confidence_level: ConfidenceLevel,
    pub trust_tier: TrustTierInfo,
    pub evidence_quality: LayerScore,
    pub stability_growth: LayerScore,
    pub compliance_readiness: ComplianceAssessment,
    pub anomalies: Vec<AnomalyFinding>,
    pub cross_source_reconciliation: ReconciliationResult,
    /// Number of records considered
    pub data_points: usize,
    pub improvement_actions: Vec<ImprovementAction>,
    /// Ties the score to the exact snapshot it was computed from
    pub snapshot_digest: String,
}

impl CredibilityScore {
    /// One-line audit summary
    pub fn summary(&self) -> String {
        format!(
            "Score {}/100 ({} confidence), {}, {} anomaly finding(s), reconciliation {}, {} record(s)",
            self.total_score,
            self.confidence_level,
            self.trust_tier.tier,
            self.anomalies.len(),
            if self.cross_source_reconciliation.passed {
                "passed"
            } else {
                "failed"
            },
            self.data_points
        )
    }
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct CredibilityEngine {
    policy: ScoringPolicy,
    detector: AnomalyDetector,
    reconciler: CrossSourceReconciler,
    evidence: EvidenceScorer,
    stability: StabilityScorer,
    compliance: ComplianceScorer,
    classifier: TrustTierClassifier,
}

impl CredibilityEngine {
    pub fn new(policy: ScoringPolicy) -> Self {
        let suggest_below = policy.composite.suggest_below;
        CredibilityEngine {
            detector: AnomalyDetector::new(policy.anomaly.clone()),
            reconciler: CrossSourceReconciler::new(policy.reconciliation.clone()),
            evidence: EvidenceScorer::new(policy.evidence.clone(), suggest_below),
            stability: StabilityScorer::new(policy.stability.clone(), suggest_below),
            compliance: ComplianceScorer::new(policy.compliance.clone(), suggest_below),
            classifier: TrustTierClassifier::new(policy.tier.clone()),
            policy,
        }
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    /// Score one snapshot. Total over any well-typed input, including the empty set.
    pub fn score(&self, records: &[NormalizedRecord]) -> CredibilityScore {
        let anomalies = self.detector.detect(records);
        let reconciliation = self.reconciler.reconcile(records);
        let evidence_quality = self.evidence.score(records);
        let stability_growth = self.stability.score(records);
        let compliance_readiness = self.compliance.score(records);

        let tier_evidence = TierEvidence::gather(records, &reconciliation);
        let requirements = self.classifier.requirements(&tier_evidence);
        let trust_tier = self.classifier.classify(&tier_evidence);

        let total_score = self.total_score(
            evidence_quality.score,
            stability_growth.score,
            compliance_readiness.score(),
            &anomalies,
        );
        let confidence_level = self.confidence_level(records, &anomalies, &reconciliation);

        let improvement_actions = self.improvement_actions(
            &evidence_quality,
            &stability_growth,
            &compliance_readiness,
            &anomalies,
            &reconciliation,
            &trust_tier,
            &requirements,
        );

        let score = CredibilityScore {
            total_score,
            confidence_level,
            trust_tier,
            evidence_quality,
            stability_growth,
            compliance_readiness,
            anomalies,
            cross_source_reconciliation: reconciliation,
            data_points: records.len(),
            improvement_actions,
            snapshot_digest: snapshot_digest(records),
        };

        tracing::info!(
            total_score = score.total_score,
            tier = score.trust_tier.tier.level(),
            confidence = %score.confidence_level,
            records = score.data_points,
            "credibility score computed"
        );

        score
    }

    /// Weighted layer sum (half-up) minus the capped anomaly deduction, clamped
    pub fn total_score(
        &self,
        evidence: u8,
        stability: u8,
        compliance: u8,
        anomalies: &[AnomalyFinding],
    ) -> u8 {
        let w = &self.policy.composite.weights;
        let weighted = evidence as u32 * w.evidence as u32
            + stability as u32 * w.stability as u32
            + compliance as u32 * w.compliance as u32;
        let base = ((weighted + 50) / 100).min(100);

        let reduction = anomalies
            .iter()
            .map(|finding| finding.confidence_reduction)
            .sum::<u32>()
            .min(self.policy.composite.max_anomaly_reduction);

        base.saturating_sub(reduction) as u8
    }

    pub fn confidence_level(
        &self,
        records: &[NormalizedRecord],
        anomalies: &[AnomalyFinding],
        reconciliation: &ReconciliationResult,
    ) -> ConfidenceLevel {
        if records.is_empty() {
            return ConfidenceLevel::Low;
        }
        if anomalies.is_empty() && reconciliation.passed {
            return ConfidenceLevel::High;
        }

        let no_high_anomalies = anomalies
            .iter()
            .all(|finding| finding.severity <= Severity::Medium);
        let minor_mismatches =
            reconciliation.mismatches_are_minor(self.policy.reconciliation.minor_mismatch_limit);

        if no_high_anomalies && minor_mismatches {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }

    // ========================================================================
    // ACTION PLAN
    // ========================================================================

    #[allow(clippy::too_many_arguments)]
    fn improvement_actions(
        &self,
        evidence: &LayerScore,
        stability: &LayerScore,
        compliance: &ComplianceAssessment,
        anomalies: &[AnomalyFinding],
        reconciliation: &ReconciliationResult,
        tier: &TrustTierInfo,
        requirements: &[TierRequirement],
    ) -> Vec<ImprovementAction> {
        let w = &self.policy.composite.weights;
        let mut candidates: Vec<RankedAction> = Vec::new();

        for (category, layer_weight, layer) in [
            (ActionCategory::Evidence, w.evidence, evidence),
            (ActionCategory::Stability, w.stability, stability),
            (ActionCategory::Compliance, w.compliance, &compliance.layer),
        ] {
            for factor in &layer.factors {
                let suggestion = match &factor.suggestion {
                    Some(suggestion) => suggestion,
                    None => continue,
                };
                let gap = factor.gap() as u32;
                let gain = (gap * factor.weight as u32 * layer_weight as u32 + 5_000) / 10_000;
                candidates.push(RankedAction::new(
                    gap,
                    ImprovementAction {
                        title: factor.action.clone(),
                        description: suggestion.clone(),
                        priority: Priority::for_category(category),
                        category,
                        effort: factor.effort,
                        potential_gain: gain,
                    },
                ));
            }
        }

        candidates.extend(self.anomaly_actions(anomalies));

        if !reconciliation.passed {
            candidates.push(RankedAction::new(
                100 - reconciliation.reconciliation_score as u32,
                ImprovementAction {
                    title: "Reconcile documents with bank statements".to_string(),
                    description: reconciliation.mismatches.join("; "),
                    priority: Priority::for_category(ActionCategory::Verification),
                    category: ActionCategory::Verification,
                    effort: Effort::Medium,
                    potential_gain: 0,
                },
            ));
        }

        if let Some(next) = tier.tier.next() {
            for requirement in requirements.iter().filter(|req| req.tier == next && !req.met) {
                let (title, category, effort) = match requirement.key {
                    RequirementKey::BankStatements => {
                        ("Upload bank statements", ActionCategory::Evidence, Effort::Low)
                    }
                    RequirementKey::Attestation => (
                        "Request independent verification",
                        ActionCategory::Verification,
                        Effort::High,
                    ),
                    // covered by the evidence factors and the reconciliation action
                    RequirementKey::DocumentBacking | RequirementKey::Reconciliation => continue,
                };
                candidates.push(RankedAction::new(
                    100,
                    ImprovementAction {
                        title: title.to_string(),
                        description: format!(
                            "Required for {}: {}",
                            next, requirement.description
                        ),
                        priority: Priority::for_category(category),
                        category,
                        effort,
                        potential_gain: 0,
                    },
                ));
            }
        }

        candidates.sort_by(|a, b| {
            b.gap
                .cmp(&a.gap)
                .then_with(|| b.action.potential_gain.cmp(&a.action.potential_gain))
                .then_with(|| a.action.category.cmp(&b.action.category))
                .then_with(|| a.action.title.cmp(&b.action.title))
        });

        candidates
            .into_iter()
            .take(self.policy.composite.max_actions)
            .map(|candidate| candidate.action)
            .collect()
    }

    /// One verification action per anomaly type, worth the deduction it causes
    fn anomaly_actions(&self, anomalies: &[AnomalyFinding]) -> Vec<RankedAction> {
        let mut by_type: BTreeMap<u8, Vec<&AnomalyFinding>> = BTreeMap::new();
        for finding in anomalies {
            by_type
                .entry(anomaly_order(finding.anomaly_type))
                .or_default()
                .push(finding);
        }

        by_type
            .into_values()
            .filter_map(|findings| {
                let first = findings.first()?;
                let deduction = findings
                    .iter()
                    .map(|finding| finding.confidence_reduction)
                    .sum::<u32>()
                    .min(self.policy.composite.max_anomaly_reduction);
                let description = if findings.len() > 1 {
                    format!("{} (and {} more)", first.description, findings.len() - 1)
                } else {
                    first.description.clone()
                };
                Some(RankedAction::new(
                    deduction,
                    ImprovementAction {
                        title: anomaly_title(first.anomaly_type).to_string(),
                        description,
                        priority: Priority::for_category(ActionCategory::Verification),
                        category: ActionCategory::Verification,
                        effort: Effort::Low,
                        potential_gain: deduction,
                    },
                ))
            })
            .collect()
    }
}

impl Default for CredibilityEngine {
    fn default() -> Self {
        Self::new(ScoringPolicy::default())
    }
}

/// Score a snapshot with the default policy
pub fn compute_credibility_score(records: &[NormalizedRecord]) -> CredibilityScore {
    CredibilityEngine::default().score(records)
}

struct RankedAction {
    /// max_score - score of the underlying factor
    gap: u32,
    action: ImprovementAction,
}

impl RankedAction {
    fn new(gap: u32, action: ImprovementAction) -> Self {
        RankedAction { gap, action }
    }
}

fn anomaly_order(anomaly_type: AnomalyType) -> u8 {
    match anomaly_type {
        AnomalyType::AmountSpike => 0,
        AnomalyType::RoundNumberBias => 1,
        AnomalyType::DuplicateAmount => 2,
        AnomalyType::UnusualFrequency => 3,
    }
}

fn anomaly_title(anomaly_type: AnomalyType) -> &'static str {
    match anomaly_type {
        AnomalyType::AmountSpike => "Explain unusually large transactions",
        AnomalyType::RoundNumberBias => "Back round-number amounts with documents",
        AnomalyType::DuplicateAmount => "Review repeated identical transactions",
        AnomalyType::UnusualFrequency => "Explain months with unusual transaction volume",
    }
}

// ============================================================================
// TESTS
// ============================================================================
