// 🏅 Trust Tier Classifier - how deeply the financial picture is verified
//
// Tiers are cumulative:
//   0 Self-Declared     no requirements
//   1 Document-Backed   document-backed ratio >= threshold
//   2 Bank-Supported    + bank statement transactions, + reconciliation passed
//   3 Verified          + human review or blockchain attestation
//
// The tier is recomputed from current evidence on every run; nothing is sticky.

use crate::layer::ratio_score;
use crate::policy::TierPolicy;
use crate::reconciliation::ReconciliationResult;
use crate::records::NormalizedRecord;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// TIERS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum TrustTier {
    SelfDeclared = 0,
    DocumentBacked = 1,
    BankSupported = 2,
    Verified = 3,
}

impl TrustTier {
    pub const ALL: [TrustTier; 4] = [
        TrustTier::SelfDeclared,
        TrustTier::DocumentBacked,
        TrustTier::BankSupported,
        TrustTier::Verified,
    ];

    pub fn level(&self) -> u8 {
        *self as u8
    }

    pub fn label(&self) -> &str {
        match self {
            TrustTier::SelfDeclared => "Self-Declared",
            TrustTier::DocumentBacked => "Document-Backed",
            TrustTier::BankSupported => "Bank-Supported",
            TrustTier::Verified => "Verified",
        }
    }

    pub fn description(&self) -> &str {
        match self {
            TrustTier::SelfDeclared => "Financial information is declared by the business owner",
            TrustTier::DocumentBacked => "Most figures are backed by uploaded documents",
            TrustTier::BankSupported => "Documents are corroborated by bank statements",
            TrustTier::Verified => "Records are independently verified",
        }
    }

    pub fn next(&self) -> Option<TrustTier> {
        match self {
            TrustTier::SelfDeclared => Some(TrustTier::DocumentBacked),
            TrustTier::DocumentBacked => Some(TrustTier::BankSupported),
            TrustTier::BankSupported => Some(TrustTier::Verified),
            TrustTier::Verified => None,
        }
    }
}

impl From<TrustTier> for u8 {
    fn from(tier: TrustTier) -> u8 {
        tier.level()
    }
}

impl TryFrom<u8> for TrustTier {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        TrustTier::ALL
            .iter()
            .copied()
            .find(|tier| tier.level() == value)
            .ok_or_else(|| format!("trust tier must be 0..=3, found {}", value))
    }
}

impl fmt::Display for TrustTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tier {} ({})", self.level(), self.label())
    }
}

// ============================================================================
// REQUIREMENTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementKey {
    DocumentBacking,
    BankStatements,
    Reconciliation,
    Attestation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierRequirement {
    pub key: RequirementKey,
    /// Lowest tier this requirement belongs to
    pub tier: TrustTier,
    pub description: String,
    pub met: bool,
}

/// Facts about the record set the requirement predicates read
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TierEvidence {
    pub total_records: usize,
    pub document_backed_ratio: u8,
    pub bank_transactions: usize,
    pub reconciliation_passed: bool,
    pub reconciliation_checks: usize,
    pub attested_records: usize,
}

impl TierEvidence {
    pub fn gather(records: &[NormalizedRecord], reconciliation: &ReconciliationResult) -> Self {
        let document_backed = records.iter().filter(|r| r.is_document_backed()).count();
        let bank_transactions = records
            .iter()
            .filter_map(NormalizedRecord::as_transaction)
            .filter(|tx| tx.meta.source.is_bank())
            .count();

        TierEvidence {
            total_records: records.len(),
            document_backed_ratio: ratio_score(document_backed, records.len()),
            bank_transactions,
            reconciliation_passed: reconciliation.passed,
            reconciliation_checks: reconciliation.checks.len(),
            attested_records: records.iter().filter(|r| r.is_attested()).count(),
        }
    }
}

/// Every tier requirement evaluated against the evidence
pub fn evaluate_requirements(evidence: &TierEvidence, policy: &TierPolicy) -> Vec<TierRequirement> {
    vec![
        TierRequirement {
            key: RequirementKey::DocumentBacking,
            tier: TrustTier::DocumentBacked,
            description: format!(
                "At least {}% of records backed by uploaded documents",
                policy.min_document_backed_ratio
            ),
            met: evidence.total_records > 0
                && evidence.document_backed_ratio >= policy.min_document_backed_ratio,
        },
        TierRequirement {
            key: RequirementKey::BankStatements,
            tier: TrustTier::BankSupported,
            description: format!(
                "At least {} transaction(s) from an uploaded bank statement",
                policy.min_bank_transactions
            ),
            met: evidence.bank_transactions >= policy.min_bank_transactions.max(1),
        },
        TierRequirement {
            key: RequirementKey::Reconciliation,
            tier: TrustTier::BankSupported,
            // a vacuous pass has nothing to corroborate
            description: "Invoices and receipts reconcile with bank statements".to_string(),
            met: evidence.reconciliation_passed && evidence.reconciliation_checks > 0,
        },
        TierRequirement {
            key: RequirementKey::Attestation,
            tier: TrustTier::Verified,
            description: "Records verified by a human reviewer or blockchain anchor".to_string(),
            met: evidence.attested_records > 0,
        },
    ]
}

// ============================================================================
// CLASSIFIER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustTierInfo {
    pub tier: TrustTier,
    pub label: String,
    pub description: String,
    /// Requirements met up to and including the assigned tier
    pub requirements: Vec<String>,
    /// Unmet requirements of the next tier; None at the top tier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_tier_requirements: Option<Vec<String>>,
}

pub struct TrustTierClassifier {
    policy: TierPolicy,
}

impl TrustTierClassifier {
    pub fn new(policy: TierPolicy) -> Self {
        TrustTierClassifier { policy }
    }

    /// Highest tier whose requirements, and those of every tier below, all hold
    pub fn assign(requirements: &[TierRequirement]) -> TrustTier {
        let mut assigned = TrustTier::SelfDeclared;
        while let Some(candidate) = assigned.next() {
            let satisfied = requirements
                .iter()
                .filter(|req| req.tier == candidate)
                .all(|req| req.met);
            if !satisfied {
                break;
            }
            assigned = candidate;
        }
        assigned
    }

    pub fn requirements(&self, evidence: &TierEvidence) -> Vec<TierRequirement> {
        evaluate_requirements(evidence, &self.policy)
    }

    pub fn classify(&self, evidence: &TierEvidence) -> TrustTierInfo {
        let requirements = self.requirements(evidence);
        let tier = Self::assign(&requirements);

        let met = requirements
            .iter()
            .filter(|req| req.tier <= tier && req.met)
            .map(|req| req.description.clone())
            .collect();

        let next_tier_requirements = tier.next().map(|next| {
            requirements
                .iter()
                .filter(|req| req.tier == next && !req.met)
                .map(|req| req.description.clone())
                .collect()
        });

        tracing::debug!(tier = tier.level(), "trust tier classified");

        TrustTierInfo {
            tier,
            label: tier.label().to_string(),
            description: tier.description().to_string(),
            requirements: met,
            next_tier_requirements,
        }
    }
}

impl Default for TrustTierClassifier {
    fn default() -> Self {
        Self::new(TierPolicy::default())
    }
}

// ============================================================================
// TESTS
// ============================================================================
