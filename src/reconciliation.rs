// ⚖️ Cross-Source Reconciler - documents must agree with the bank
//
// For each pairable group the two independently sourced totals are compared over
// the months both sides cover:
//
//   delta = |total_a - total_b| / max(total_a, total_b, 1)
//
// delta below the tolerance is a match. The score deducts every delta weighted by
// the group's importance. A side with no records at all is a mismatch: missing
// corroboration is a signal, not something to skip. Records outside the shared
// months are counted and reported as notes so nothing drops out silently.

use crate::policy::ReconciliationPolicy;
use crate::records::{format_amount, Direction, Minor, MonthKey, NormalizedRecord};
use serde::{Deserialize, Serialize};

// ============================================================================
// PAIRING GROUPS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairingGroup {
    /// Invoice totals vs bank deposits
    InvoicesVsDeposits,
    /// Receipt totals vs bank payments
    ReceiptsVsPayments,
}

impl PairingGroup {
    pub fn labels(&self) -> (&'static str, &'static str) {
        match self {
            PairingGroup::InvoicesVsDeposits => ("invoice totals", "bank deposits"),
            PairingGroup::ReceiptsVsPayments => ("receipt totals", "bank payments"),
        }
    }

    fn weight(&self, policy: &ReconciliationPolicy) -> u8 {
        match self {
            PairingGroup::InvoicesVsDeposits => policy.invoice_weight,
            PairingGroup::ReceiptsVsPayments => policy.receipt_weight,
        }
    }

    /// Which side of the group a record feeds, with its amount (None = unknown)
    fn side_of(&self, record: &NormalizedRecord) -> Option<(Side, Option<Minor>)> {
        match (self, record) {
            (PairingGroup::InvoicesVsDeposits, NormalizedRecord::Invoice(invoice)) => {
                Some((Side::Documents, invoice.total))
            }
            (PairingGroup::ReceiptsVsPayments, NormalizedRecord::Receipt(receipt)) => {
                Some((Side::Documents, receipt.total))
            }
            (PairingGroup::InvoicesVsDeposits, NormalizedRecord::Transaction(tx))
                if tx.meta.source.is_bank() && tx.direction == Direction::Credit =>
            {
                Some((Side::Bank, tx.amount))
            }
            (PairingGroup::ReceiptsVsPayments, NormalizedRecord::Transaction(tx))
                if tx.meta.source.is_bank() && tx.direction == Direction::Debit =>
            {
                Some((Side::Bank, tx.amount))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Documents,
    Bank,
}

// ============================================================================
// RECONCILIATION RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceTotal {
    pub label: String,
    pub records: usize,
    pub total: Minor,
    /// Records outside the months both sides cover, left out of `total`
    #[serde(default)]
    pub excluded_records: usize,
    #[serde(default)]
    pub excluded_total: Minor,
}

/// Comparison of one pairable group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceCheck {
    pub group: PairingGroup,
    pub left: SourceTotal,
    pub right: SourceTotal,
    /// Relative difference, 0.0..=1.0
    pub delta: f64,
    pub matched: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationResult {
    pub passed: bool,
    pub mismatches: Vec<String>,
    pub reconciliation_score: u8,
    pub checks: Vec<SourceCheck>,
    /// Informational only; notes never fail the reconciliation
    #[serde(default)]
    pub notes: Vec<String>,
}

impl ReconciliationResult {
    /// Nothing to reconcile is not a red flag
    pub fn vacuous() -> Self {
        ReconciliationResult {
            passed: true,
            mismatches: Vec::new(),
            reconciliation_score: 100,
            checks: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub fn is_vacuous(&self) -> bool {
        self.checks.is_empty()
    }

    /// True when every failed check stays below `limit`
    pub fn mismatches_are_minor(&self, limit: f64) -> bool {
        self.checks
            .iter()
            .filter(|check| !check.matched)
            .all(|check| check.delta < limit)
    }

    pub fn summary(&self) -> String {
        if self.is_vacuous() {
            return "No data to reconcile".to_string();
        }
        format!(
            "Reconciliation {}: score {}, {} of {} group(s) matched",
            if self.passed { "passed" } else { "failed" },
            self.reconciliation_score,
            self.checks.iter().filter(|check| check.matched).count(),
            self.checks.len()
        )
    }
}

// ============================================================================
// RECONCILER
// ============================================================================

pub struct CrossSourceReconciler {
    policy: ReconciliationPolicy,
}

impl CrossSourceReconciler {
    pub fn new(policy: ReconciliationPolicy) -> Self {
        CrossSourceReconciler { policy }
    }

    pub fn reconcile(&self, records: &[NormalizedRecord]) -> ReconciliationResult {
        let checks: Vec<SourceCheck> = [PairingGroup::InvoicesVsDeposits, PairingGroup::ReceiptsVsPayments]
            .iter()
            .filter_map(|group| {
                let mut documents = Vec::new();
                let mut bank = Vec::new();
                for record in records {
                    match group.side_of(record) {
                        Some((Side::Documents, amount)) => documents.push((record.month(), amount)),
                        Some((Side::Bank, amount)) => bank.push((record.month(), amount)),
                        None => {}
                    }
                }
                self.compare(*group, &documents, &bank)
            })
            .collect();

        if checks.is_empty() {
            return ReconciliationResult::vacuous();
        }

        let weight_sum: f64 = checks
            .iter()
            .map(|check| check.group.weight(&self.policy) as f64)
            .sum();
        let deduction: f64 = if weight_sum > 0.0 {
            checks
                .iter()
                .map(|check| check.delta * 100.0 * check.group.weight(&self.policy) as f64 / weight_sum)
                .sum()
        } else {
            0.0
        };
        let reconciliation_score = (100.0 - deduction).round().clamp(0.0, 100.0) as u8;

        let mismatches: Vec<String> = checks
            .iter()
            .filter(|check| !check.matched)
            .map(describe_mismatch)
            .collect();

        let notes: Vec<String> = checks
            .iter()
            .flat_map(|check| [&check.left, &check.right])
            .filter(|side| side.excluded_records > 0)
            .map(describe_exclusion)
            .collect();

        tracing::debug!(
            groups = checks.len(),
            mismatches = mismatches.len(),
            excluded = notes.len(),
            reconciliation_score,
            "cross-source reconciliation finished"
        );

        ReconciliationResult {
            passed: mismatches.is_empty(),
            mismatches,
            reconciliation_score,
            checks,
            notes,
        }
    }

    /// Compare one group; None when neither side has records
    ///
    /// Both sides are summed over the months they have in common, so the result does
    /// not depend on which source is passed first.
    pub fn compare(
        &self,
        group: PairingGroup,
        left: &[(MonthKey, Option<Minor>)],
        right: &[(MonthKey, Option<Minor>)],
    ) -> Option<SourceCheck> {
        if left.is_empty() && right.is_empty() {
            return None;
        }

        let period = overlapping_period(left, right);
        let (left_label, right_label) = group.labels();
        let left_total = side_total(left_label, left, period);
        let right_total = side_total(right_label, right, period);

        let delta = relative_delta(left_total.total, right_total.total);
        let matched = !left.is_empty() && !right.is_empty() && delta < self.policy.tolerance;

        Some(SourceCheck {
            group,
            left: left_total,
            right: right_total,
            delta,
            matched,
        })
    }
}

impl Default for CrossSourceReconciler {
    fn default() -> Self {
        Self::new(ReconciliationPolicy::default())
    }
}

/// |a - b| / max(a, b, 1)
pub fn relative_delta(a: Minor, b: Minor) -> f64 {
    let denominator = a.max(b).max(1) as f64;
    ((a as i128 - b as i128).abs() as f64 / denominator).min(1.0)
}

/// Months covered by both sides; None when they do not overlap or a side is empty
fn overlapping_period(
    left: &[(MonthKey, Option<Minor>)],
    right: &[(MonthKey, Option<Minor>)],
) -> Option<(MonthKey, MonthKey)> {
    let bounds = |entries: &[(MonthKey, Option<Minor>)]| {
        let first = entries.iter().map(|(month, _)| *month).min()?;
        let last = entries.iter().map(|(month, _)| *month).max()?;
        Some((first, last))
    };

    let (left_first, left_last) = bounds(left)?;
    let (right_first, right_last) = bounds(right)?;
    let first = left_first.max(right_first);
    let last = left_last.min(right_last);

    (first <= last).then_some((first, last))
}

fn side_total(
    label: &str,
    entries: &[(MonthKey, Option<Minor>)],
    period: Option<(MonthKey, MonthKey)>,
) -> SourceTotal {
    let (in_period, excluded): (Vec<_>, Vec<_>) =
        entries.iter().partition(|(month, _)| match period {
            Some((first, last)) => *month >= first && *month <= last,
            None => true,
        });
    let sum = |part: &[&(MonthKey, Option<Minor>)]| {
        part.iter()
            .filter_map(|(_, amount)| *amount)
            .fold(0, Minor::saturating_add)
    };

    SourceTotal {
        label: label.to_string(),
        records: in_period.len(),
        total: sum(&in_period),
        excluded_records: excluded.len(),
        excluded_total: sum(&excluded),
    }
}

fn describe_exclusion(side: &SourceTotal) -> String {
    format!(
        "{} {} record(s) ({}) fall outside the months both sources cover and were not compared",
        side.excluded_records,
        side.label,
        format_amount(side.excluded_total)
    )
}

fn describe_mismatch(check: &SourceCheck) -> String {
    if check.right.records == 0 {
        return format!(
            "No corroborating bank record for {} ({})",
            check.left.label,
            format_amount(check.left.total)
        );
    }
    if check.left.records == 0 {
        return format!(
            "No {} found to corroborate {} ({})",
            check.left.label,
            check.right.label,
            format_amount(check.right.total)
        );
    }
    format!(
        "{} ({}) vs {} ({}) differ by {:.1}%",
        capitalize(&check.left.label),
        format_amount(check.left.total),
        check.right.label,
        format_amount(check.right.total),
        check.delta * 100.0
    )
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

// ============================================================================
// TESTS
// ============================================================================
