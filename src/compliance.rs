// 🧾 Compliance Readiness Scorer - filings, tax evidence and deadlines
//
// Sub-metrics (0-100 each):
//   vatEvidence        invoices showing collected VAT / invoices
//   taxDocuments       tax-relevant document kinds on file (of 4)
//   taxProvisioning    P&L statements with a tax expense line / P&L statements
//   filingTimeliness   age of the latest annual statement

use crate::layer::{fold_layer, ratio_score, Effort, LayerScore, MetricSpec, ScoreFlag};
use crate::policy::{CompliancePolicy, RiskBands};
use crate::records::NormalizedRecord;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// RISK LEVEL
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Banded, monotonic mapping: every score lands in exactly one level
    pub fn from_score(score: u8, bands: &RiskBands) -> Self {
        if score >= bands.low {
            RiskLevel::Low
        } else if score >= bands.medium {
            RiskLevel::Medium
        } else if score >= bands.high {
            RiskLevel::High
        } else {
            RiskLevel::Critical
        }
    }

    pub fn name(&self) -> &str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
            RiskLevel::Critical => "Critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceAssessment {
    #[serde(flatten)]
    pub layer: LayerScore,
    pub risk_level: RiskLevel,
    pub assessment: String,
}

impl ComplianceAssessment {
    pub fn score(&self) -> u8 {
        self.layer.score
    }
}

// ============================================================================
// SIGNALS
// ============================================================================

/// Tax-relevant document kinds an assessor expects on file
const TAX_DOCUMENT_KINDS: [(&str, &str); 4] = [
    ("invoice", "invoices"),
    ("receipt", "receipts"),
    ("profit_loss", "profit & loss statement"),
    ("balance_sheet", "balance sheet"),
];

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ComplianceSignals {
    pub invoices: usize,
    pub invoices_with_vat: usize,
    pub missing_kinds: Vec<&'static str>,
    pub profit_loss_statements: usize,
    pub provisioned_statements: usize,
    /// Days between the latest annual statement and the latest record
    pub statement_age_days: Option<i64>,
    pub vat_evidence: u8,
    pub tax_documents: u8,
    pub tax_provisioning: u8,
    pub filing_timeliness: u8,
}

pub struct ComplianceScorer {
    policy: CompliancePolicy,
    suggest_below: u8,
}

impl ComplianceScorer {
    pub fn new(policy: CompliancePolicy, suggest_below: u8) -> Self {
        ComplianceScorer {
            policy,
            suggest_below,
        }
    }

    fn table(&self) -> Vec<MetricSpec<ComplianceSignals>> {
        let w = &self.policy.weights;
        vec![
            MetricSpec {
                name: "vatEvidence",
                weight: w.vat_evidence,
                extract: |s| s.vat_evidence,
                effort: Effort::Low,
                action: "Show VAT collection on invoices",
                suggestion: "Upload invoices that state the VAT amount collected",
            },
            MetricSpec {
                name: "taxDocuments",
                weight: w.tax_documents,
                extract: |s| s.tax_documents,
                effort: Effort::Medium,
                action: "Complete the tax document set",
                suggestion: "Add the missing invoices, receipts, profit & loss statement or balance sheet",
            },
            MetricSpec {
                name: "taxProvisioning",
                weight: w.tax_provisioning,
                extract: |s| s.tax_provisioning,
                effort: Effort::Medium,
                action: "Provision for income tax",
                suggestion: "Include a tax expense line in the profit & loss statement",
            },
            MetricSpec {
                name: "filingTimeliness",
                weight: w.filing_timeliness,
                extract: |s| s.filing_timeliness,
                effort: Effort::High,
                action: "File current annual statements",
                suggestion: "Upload a profit & loss statement or balance sheet covering the last financial year",
            },
        ]
    }

    pub fn signals(&self, records: &[NormalizedRecord]) -> ComplianceSignals {
        let mut signals = ComplianceSignals::default();

        let mut latest_record: Option<NaiveDate> = None;
        let mut latest_statement: Option<NaiveDate> = None;

        for record in records {
            latest_record = latest_record.max(Some(record.date()));
            match record {
                NormalizedRecord::Invoice(invoice) => {
                    signals.invoices += 1;
                    if matches!(invoice.vat_amount, Some(vat) if vat > 0) {
                        signals.invoices_with_vat += 1;
                    }
                }
                NormalizedRecord::ProfitLoss(pl) => {
                    signals.profit_loss_statements += 1;
                    if pl.tax_expense.is_some() {
                        signals.provisioned_statements += 1;
                    }
                    latest_statement = latest_statement.max(Some(pl.period_end.unwrap_or(pl.meta.date)));
                }
                NormalizedRecord::BalanceSheet(sheet) => {
                    latest_statement = latest_statement.max(Some(sheet.meta.date));
                }
                _ => {}
            }
        }

        signals.missing_kinds = TAX_DOCUMENT_KINDS
            .iter()
            .filter(|(kind, _)| {
                !records
                    .iter()
                    .any(|r| r.is_document_backed() && r.kind() == *kind)
            })
            .map(|(_, label)| *label)
            .collect();

        signals.statement_age_days = match (latest_record, latest_statement) {
            (Some(record), Some(statement)) => Some((record - statement).num_days().max(0)),
            _ => None,
        };

        signals.vat_evidence = ratio_score(signals.invoices_with_vat, signals.invoices);
        signals.tax_documents = ratio_score(
            TAX_DOCUMENT_KINDS.len() - signals.missing_kinds.len(),
            TAX_DOCUMENT_KINDS.len(),
        );
        signals.tax_provisioning =
            ratio_score(signals.provisioned_statements, signals.profit_loss_statements);
        signals.filing_timeliness = match signals.statement_age_days {
            Some(age) if age <= self.policy.statement_max_age_days => 100,
            Some(age) if age <= self.policy.statement_max_age_days.saturating_mul(2) => {
                self.policy.stale_statement_credit
            }
            _ => 0,
        };

        signals
    }

    pub fn score(&self, records: &[NormalizedRecord]) -> ComplianceAssessment {
        let signals = self.signals(records);
        let mut flags = Vec::new();

        if records.is_empty() {
            flags.push(ScoreFlag::critical("No records available to assess compliance", 0));
        } else {
            if signals.vat_evidence == 0 {
                flags.push(ScoreFlag::warning(
                    if signals.invoices == 0 {
                        "No invoices on file to evidence VAT collection".to_string()
                    } else {
                        format!("None of {} invoice(s) show VAT collected", signals.invoices)
                    },
                    self.policy.missing_filing_impact,
                ));
            }
            if signals.profit_loss_statements == 0 {
                flags.push(ScoreFlag::warning(
                    "No profit & loss statement on file",
                    self.policy.missing_filing_impact,
                ));
            }
            if let Some(age) = signals.statement_age_days {
                if age > self.policy.statement_max_age_days {
                    flags.push(ScoreFlag::warning(
                        format!("Latest annual statement is {} days old", age),
                        self.policy.overdue_filing_impact,
                    ));
                }
            }
            if signals.vat_evidence > 0
                && signals.profit_loss_statements > 0
                && signals.filing_timeliness == 100
            {
                flags.push(ScoreFlag::positive(
                    "VAT evidence and current annual statements on file",
                ));
            }
        }

        let layer = fold_layer(&self.table(), &signals, flags, self.suggest_below);
        let risk_level = RiskLevel::from_score(layer.score, &self.policy.risk_bands);
        let assessment = describe(risk_level, &signals);

        tracing::debug!(
            score = layer.score,
            risk_level = %risk_level,
            "compliance readiness scored"
        );

        ComplianceAssessment {
            layer,
            risk_level,
            assessment,
        }
    }
}

impl Default for ComplianceScorer {
    fn default() -> Self {
        Self::new(CompliancePolicy::default(), 80)
    }
}

fn describe(risk_level: RiskLevel, signals: &ComplianceSignals) -> String {
    let mut missing: Vec<String> = Vec::new();

    if signals.vat_evidence == 0 {
        missing.push("VAT collection evidence".to_string());
    }
    missing.extend(signals.missing_kinds.iter().map(|kind| kind.to_string()));
    if signals.profit_loss_statements > 0 && signals.tax_provisioning == 0 {
        missing.push("tax provision in the profit & loss statement".to_string());
    }
    if signals.filing_timeliness < 100 {
        missing.push("a current annual statement".to_string());
    }

    if missing.is_empty() {
        format!(
            "{} compliance risk. Required filings are present and current.",
            risk_level
        )
    } else {
        format!("{} compliance risk. Missing: {}.", risk_level, missing.join(", "))
    }
}

// ============================================================================
// TESTS
// ============================================================================
