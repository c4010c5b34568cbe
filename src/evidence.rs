// 📑 Evidence Quality Scorer - how much of the picture is backed by documents
//
// Sub-metrics (0-100 each):
//   documentBackedRatio   document-backed records / all records
//   consistencyScore      100 - penalties for duplicate and conflicting entries
//   continuityScore       months with records / months spanned
//   metadataScore         documents without extraction errors / documents

use crate::anomaly::duplicate_clusters;
use crate::layer::{fold_layer, ratio_score, Effort, LayerScore, MetricSpec, ScoreFlag};
use crate::policy::EvidencePolicy;
use crate::records::{format_amount, MonthKey, NormalizedRecord, TransactionRecord};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Measured inputs of the evidence layer, before weighting
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EvidenceSignals {
    pub total_records: usize,
    pub document_backed: usize,
    pub document_backed_ratio: u8,
    pub consistency: u8,
    pub continuity: u8,
    pub metadata: u8,
}

/// A run of consecutive months without any record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverageGap {
    pub first: MonthKey,
    pub last: MonthKey,
    pub months: usize,
}

/// Same invoice number seen with different totals
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentConflict {
    pub invoice_number: String,
    pub record_ids: Vec<String>,
    pub totals: Vec<i64>,
}

pub struct EvidenceScorer {
    policy: EvidencePolicy,
    suggest_below: u8,
}

impl EvidenceScorer {
    pub fn new(policy: EvidencePolicy, suggest_below: u8) -> Self {
        EvidenceScorer {
            policy,
            suggest_below,
        }
    }

    fn table(&self) -> Vec<MetricSpec<EvidenceSignals>> {
        let w = &self.policy.weights;
        vec![
            MetricSpec {
                name: "documentBackedRatio",
                weight: w.document_backed,
                extract: |s| s.document_backed_ratio,
                effort: Effort::Medium,
                action: "Upload supporting documents",
                suggestion: "Replace manual entries with uploaded bank statements, invoices and receipts",
            },
            MetricSpec {
                name: "consistencyScore",
                weight: w.consistency,
                extract: |s| s.consistency,
                effort: Effort::Low,
                action: "Resolve duplicate and conflicting entries",
                suggestion: "Remove repeated uploads and correct invoices recorded with different totals",
            },
            MetricSpec {
                name: "continuityScore",
                weight: w.continuity,
                extract: |s| s.continuity,
                effort: Effort::Medium,
                action: "Fill gaps in monthly records",
                suggestion: "Upload records for the months that currently have none",
            },
            MetricSpec {
                name: "metadataScore",
                weight: w.metadata,
                extract: |s| s.metadata,
                effort: Effort::Low,
                action: "Re-upload unreadable documents",
                suggestion: "Provide clearer scans for documents that failed to parse",
            },
        ]
    }

    pub fn score(&self, records: &[NormalizedRecord]) -> LayerScore {
        let transactions: Vec<&TransactionRecord> =
            records.iter().filter_map(NormalizedRecord::as_transaction).collect();

        // the same clusters the duplicate-amount anomaly rule reports
        let clusters = duplicate_clusters(
            &transactions,
            self.policy.duplicate_window_days,
            self.policy.duplicate_group_size,
        );
        let transaction_surplus: usize = clusters.iter().map(|cluster| cluster.len() - 1).sum();
        let document_surplus = duplicate_document_surplus(records);
        let conflicts = invoice_conflicts(records);
        let gaps = coverage_gaps(records);

        let document_backed = records.iter().filter(|r| r.is_document_backed()).count();
        let clean_documents = records
            .iter()
            .filter(|r| r.is_document_backed() && r.meta().extraction_errors.is_empty())
            .count();

        let penalty = (transaction_surplus + document_surplus) as u32 * self.policy.duplicate_penalty
            + conflicts.len() as u32 * self.policy.conflict_penalty;

        let signals = EvidenceSignals {
            total_records: records.len(),
            document_backed,
            document_backed_ratio: ratio_score(document_backed, records.len()),
            consistency: if records.is_empty() {
                0
            } else {
                100 - penalty.min(100) as u8
            },
            continuity: continuity_score(records),
            metadata: ratio_score(clean_documents, document_backed),
        };

        let mut flags = Vec::new();

        if records.is_empty() {
            flags.push(ScoreFlag::critical("No financial records on file", 0));
        } else if document_backed == 0 {
            flags.push(ScoreFlag::critical(
                "No document-backed evidence: every figure is self-declared",
                self.policy.zero_evidence_impact,
            ));
        } else if signals.document_backed_ratio >= self.policy.strong_backing_ratio {
            flags.push(ScoreFlag::positive(format!(
                "{}% of records are backed by uploaded documents",
                signals.document_backed_ratio
            )));
        }

        for cluster in &clusters {
            flags.push(ScoreFlag::warning(
                format!(
                    "{} transactions of {} recorded within {} day(s)",
                    cluster.len(),
                    format_amount(cluster.amount),
                    cluster.span_days()
                ),
                self.policy.duplicate_flag_impact,
            ));
        }

        for conflict in &conflicts {
            let totals: Vec<String> = conflict.totals.iter().map(|t| format_amount(*t)).collect();
            flags.push(ScoreFlag::critical(
                format!(
                    "Invoice {} appears with conflicting totals: {}",
                    conflict.invoice_number,
                    totals.join(", ")
                ),
                self.policy.conflict_flag_impact,
            ));
        }

        for gap in gaps
            .iter()
            .filter(|gap| gap.months >= self.policy.gap_flag_months)
        {
            flags.push(ScoreFlag::warning(
                format!(
                    "No records for {} consecutive months ({} to {})",
                    gap.months, gap.first, gap.last
                ),
                self.policy.gap_impact_per_month * gap.months as i32,
            ));
        }

        let with_errors = records
            .iter()
            .filter(|r| !r.meta().extraction_errors.is_empty())
            .count();
        if with_errors > 0 {
            flags.push(ScoreFlag::info(format!(
                "{} document(s) reported extraction errors",
                with_errors
            )));
        }

        let layer = fold_layer(&self.table(), &signals, flags, self.suggest_below);

        tracing::debug!(
            score = layer.score,
            document_backed_ratio = signals.document_backed_ratio,
            consistency = signals.consistency,
            continuity = signals.continuity,
            metadata = signals.metadata,
            "evidence quality scored"
        );

        layer
    }
}

impl Default for EvidenceScorer {
    fn default() -> Self {
        Self::new(EvidencePolicy::default(), 80)
    }
}

/// Months with at least one record over months spanned, as 0..=100
pub fn continuity_score(records: &[NormalizedRecord]) -> u8 {
    let covered: BTreeSet<MonthKey> = records.iter().map(NormalizedRecord::month).collect();
    let (first, last) = match (covered.first(), covered.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return 0,
    };
    let spanned = (last.index() - first.index() + 1) as usize;
    ratio_score(covered.len(), spanned)
}

/// Uncovered month runs between the first and last record
pub fn coverage_gaps(records: &[NormalizedRecord]) -> Vec<CoverageGap> {
    let covered: BTreeSet<MonthKey> = records.iter().map(NormalizedRecord::month).collect();
    let (first, last) = match (covered.first(), covered.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return Vec::new(),
    };

    let mut gaps = Vec::new();
    let mut open: Option<CoverageGap> = None;

    for month in MonthKey::range(first, last) {
        if covered.contains(&month) {
            if let Some(gap) = open.take() {
                gaps.push(gap);
            }
            continue;
        }
        match open.as_mut() {
            Some(gap) => {
                gap.last = month;
                gap.months += 1;
            }
            None => {
                open = Some(CoverageGap {
                    first: month,
                    last: month,
                    months: 1,
                })
            }
        }
    }

    gaps
}

/// Extra copies of identical non-transaction documents (same fingerprint)
fn duplicate_document_surplus(records: &[NormalizedRecord]) -> usize {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for record in records.iter().filter(|r| r.as_transaction().is_none()) {
        if record.primary_amount().is_none() {
            continue;
        }
        *counts.entry(record.fingerprint()).or_insert(0) += 1;
    }
    counts.values().map(|count| count - 1).sum()
}

/// Invoice numbers recorded with more than one distinct known total
pub fn invoice_conflicts(records: &[NormalizedRecord]) -> Vec<DocumentConflict> {
    let mut by_number: BTreeMap<String, Vec<(String, i64)>> = BTreeMap::new();
    for record in records {
        if let NormalizedRecord::Invoice(invoice) = record {
            if let (Some(number), Some(total)) = (&invoice.invoice_number, invoice.total) {
                by_number
                    .entry(number.trim().to_uppercase())
                    .or_default()
                    .push((invoice.meta.id.clone(), total));
            }
        }
    }

    by_number
        .into_iter()
        .filter_map(|(invoice_number, entries)| {
            let totals: BTreeSet<i64> = entries.iter().map(|(_, total)| *total).collect();
            (totals.len() > 1).then(|| DocumentConflict {
                invoice_number,
                record_ids: entries.into_iter().map(|(id, _)| id).collect(),
                totals: totals.into_iter().collect(),
            })
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::FlagKind;
    use crate::records::{
        Direction, InvoiceRecord, Minor, Provenance, RecordMeta, SourceType, TransactionRecord,
    };
    use chrono::NaiveDate;

    fn create_test_meta(id: &str, date: &str, provenance: Provenance) -> RecordMeta {
        RecordMeta {
            id: id.to_string(),
            source: SourceType::BankStatement,
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            provenance,
            extraction_errors: Vec::new(),
            attestation: None,
        }
    }

    fn create_test_transaction(id: &str, date: &str, amount: Minor) -> NormalizedRecord {
        NormalizedRecord::Transaction(TransactionRecord {
            meta: create_test_meta(id, date, Provenance::DocumentBacked),
            direction: Direction::Credit,
            amount: Some(amount),
            counterparty: None,
        })
    }

    fn create_test_manual(id: &str, date: &str, amount: Minor) -> NormalizedRecord {
        NormalizedRecord::Transaction(TransactionRecord {
            meta: create_test_meta(id, date, Provenance::ManualEntry),
            direction: Direction::Credit,
            amount: Some(amount),
            counterparty: None,
        })
    }

    fn create_test_invoice(id: &str, number: &str, date: &str, total: Minor) -> NormalizedRecord {
        let mut meta = create_test_meta(id, date, Provenance::DocumentBacked);
        meta.source = SourceType::Invoice;
        NormalizedRecord::Invoice(InvoiceRecord {
            meta,
            invoice_number: Some(number.to_string()),
            total: Some(total),
            vat_amount: None,
        })
    }

    #[test]
    fn test_empty_records_score_zero() {
        let layer = EvidenceScorer::default().score(&[]);

        assert_eq!(layer.score, 0);
        assert_eq!(layer.metric("consistencyScore"), Some(0));
        assert!(layer.has_critical());
    }

    #[test]
    fn test_clean_document_backed_history_scores_full() {
        let records = vec![
            create_test_transaction("t1", "2025-01-10", 10_000),
            create_test_transaction("t2", "2025-02-10", 12_000),
            create_test_transaction("t3", "2025-03-10", 11_000),
        ];

        let layer = EvidenceScorer::default().score(&records);

        assert_eq!(layer.score, 100);
        assert!(layer.flags.iter().any(|f| f.kind == FlagKind::Positive));
        assert!(layer.factors.iter().all(|f| f.suggestion.is_none()));
    }

    #[test]
    fn test_all_manual_entries_raise_zero_evidence_flag() {
        let records = vec![
            create_test_manual("m1", "2025-01-10", 10_000),
            create_test_manual("m2", "2025-02-10", 12_000),
        ];

        let layer = EvidenceScorer::default().score(&records);

        // consistency 20 + continuity 15 - 10 flag
        assert_eq!(layer.weighted_base(), 35);
        assert_eq!(layer.score, 25);
        assert_eq!(layer.metric("documentBackedRatio"), Some(0));
        assert_eq!(layer.metric("metadataScore"), Some(0));
        assert!(layer.factors[0].suggestion.is_some());
    }

    #[test]
    fn test_duplicates_lower_consistency_and_flag() {
        let records = vec![
            create_test_transaction("t1", "2025-01-10", 50_000),
            create_test_transaction("t2", "2025-01-10", 50_000),
            create_test_transaction("t3", "2025-01-11", 50_000),
        ];

        let layer = EvidenceScorer::default().score(&records);

        assert_eq!(layer.metric("consistencyScore"), Some(80));
        let warning = layer
            .flags
            .iter()
            .find(|f| f.kind == FlagKind::Warning)
            .unwrap();
        assert_eq!(warning.impact, -3);
        assert!(warning.message.starts_with("3 transactions of 500.00"));
    }

    #[test]
    fn test_pair_of_equal_amounts_is_not_a_duplicate() {
        let records = vec![
            create_test_transaction("t1", "2025-01-10", 99_137),
            create_test_transaction("t2", "2025-01-11", 99_137),
        ];

        let layer = EvidenceScorer::default().score(&records);

        assert_eq!(layer.metric("consistencyScore"), Some(100));
        assert!(!layer.flags.iter().any(|f| f.kind == FlagKind::Warning));
        assert_eq!(layer.score, 100);
    }

    #[test]
    fn test_conflicting_invoice_totals() {
        let records = vec![
            create_test_invoice("i1", "INV-7", "2025-01-10", 10_000),
            create_test_invoice("i2", "inv-7", "2025-01-12", 14_000),
        ];

        let conflicts = invoice_conflicts(&records);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].totals, vec![10_000, 14_000]);

        let layer = EvidenceScorer::default().score(&records);
        assert_eq!(layer.metric("consistencyScore"), Some(85));
        assert!(layer.flags.iter().any(|f| f.kind == FlagKind::Critical && f.impact == -5));
    }

    #[test]
    fn test_reuploaded_invoice_counts_as_duplicate() {
        let records = vec![
            create_test_invoice("i1", "INV-9", "2025-01-10", 10_000),
            create_test_invoice("i2", "INV-9", "2025-01-10", 10_000),
        ];

        let layer = EvidenceScorer::default().score(&records);

        assert_eq!(layer.metric("consistencyScore"), Some(90));
        assert!(invoice_conflicts(&records).is_empty());
    }

    #[test]
    fn test_gaps_reduce_continuity_and_flag() {
        let records = vec![
            create_test_transaction("t1", "2025-01-10", 10_000),
            create_test_transaction("t2", "2025-05-10", 12_000),
        ];

        let gaps = coverage_gaps(&records);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].months, 3);
        assert_eq!(gaps[0].first.to_string(), "2025-02");

        let layer = EvidenceScorer::default().score(&records);
        assert_eq!(layer.metric("continuityScore"), Some(40));
        assert!(layer.flags.iter().any(|f| f.impact == -3));
    }

    #[test]
    fn test_filling_a_gap_never_lowers_score() {
        let mut records = vec![
            create_test_transaction("t1", "2025-01-10", 10_000),
            create_test_transaction("t2", "2025-04-10", 12_000),
        ];
        let before = EvidenceScorer::default().score(&records).score;

        records.push(create_test_transaction("t3", "2025-02-14", 9_000));
        let after = EvidenceScorer::default().score(&records).score;

        assert!(after >= before);
    }

    #[test]
    fn test_extraction_errors_lower_metadata() {
        let mut record = create_test_transaction("t1", "2025-01-10", 10_000);
        if let NormalizedRecord::Transaction(tx) = &mut record {
            tx.meta.extraction_errors.push("amount column unreadable".to_string());
        }
        let records = vec![record, create_test_transaction("t2", "2025-01-20", 20_000)];

        let layer = EvidenceScorer::default().score(&records);

        assert_eq!(layer.metric("metadataScore"), Some(50));
        assert!(layer.flags.iter().any(|f| f.kind == FlagKind::Info));
    }
}
