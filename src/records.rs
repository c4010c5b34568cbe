// 📄 Normalized Records - canonical extracted financial documents
//
// Every document the extraction service hands over lands here as one immutable value.
// Amounts are integer minor units; a `None` amount means "unknown" and is excluded
// from every aggregate instead of being read as zero.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;

/// Monetary amount in minor currency units (cents, santim, ...)
pub type Minor = i64;

/// Render minor units as a major-unit string with two decimals
pub fn format_amount(amount: Minor) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

// ============================================================================
// PROVENANCE & SOURCES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Extracted from an uploaded document
    DocumentBacked,
    /// Typed in by the business owner
    ManualEntry,
}

/// Which kind of document (or ledger) a record was extracted from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    BankStatement,
    MobileMoney,
    Invoice,
    Receipt,
    ProfitLossStatement,
    BalanceSheet,
    Ledger,
}

impl SourceType {
    /// Human-readable name for display
    pub fn name(&self) -> &str {
        match self {
            SourceType::BankStatement => "Bank statement",
            SourceType::MobileMoney => "Mobile money statement",
            SourceType::Invoice => "Invoice",
            SourceType::Receipt => "Receipt",
            SourceType::ProfitLossStatement => "Profit & loss statement",
            SourceType::BalanceSheet => "Balance sheet",
            SourceType::Ledger => "Cash ledger",
        }
    }

    /// Only bank statements are independent enough to corroborate other sources
    pub fn is_bank(&self) -> bool {
        matches!(self, SourceType::BankStatement)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttestationKind {
    HumanReview,
    BlockchainAnchor,
}

/// External verification signal attached to a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    pub kind: AttestationKind,
    /// Reviewer id or anchor transaction hash
    pub reference: String,
}

// ============================================================================
// RECORD VARIANTS
// ============================================================================

/// Fields shared by every record variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMeta {
    pub id: String,
    pub source: SourceType,
    pub date: NaiveDate,
    pub provenance: Provenance,

    /// Problems the extraction service reported while parsing the document
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extraction_errors: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attestation: Option<Attestation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Money in (deposit)
    Credit,
    /// Money out (payment)
    Debit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub direction: Direction,
    #[serde(default)]
    pub amount: Option<Minor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterparty: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    #[serde(flatten)]
    pub meta: RecordMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,
    #[serde(default)]
    pub total: Option<Minor>,
    #[serde(default)]
    pub vat_amount: Option<Minor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptRecord {
    #[serde(flatten)]
    pub meta: RecordMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(default)]
    pub total: Option<Minor>,
    #[serde(default)]
    pub vat_amount: Option<Minor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfitLossRecord {
    #[serde(flatten)]
    pub meta: RecordMeta,
    #[serde(default)]
    pub period_start: Option<NaiveDate>,
    #[serde(default)]
    pub period_end: Option<NaiveDate>,
    #[serde(default)]
    pub revenue: Option<Minor>,
    #[serde(default)]
    pub expenses: Option<Minor>,
    #[serde(default)]
    pub tax_expense: Option<Minor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSheetRecord {
    #[serde(flatten)]
    pub meta: RecordMeta,
    #[serde(default)]
    pub total_assets: Option<Minor>,
    #[serde(default)]
    pub total_liabilities: Option<Minor>,
    #[serde(default)]
    pub equity: Option<Minor>,
}

/// One extracted document, tagged by kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NormalizedRecord {
    Transaction(TransactionRecord),
    Invoice(InvoiceRecord),
    Receipt(ReceiptRecord),
    ProfitLoss(ProfitLossRecord),
    BalanceSheet(BalanceSheetRecord),
}

impl NormalizedRecord {
    pub fn meta(&self) -> &RecordMeta {
        match self {
            NormalizedRecord::Transaction(r) => &r.meta,
            NormalizedRecord::Invoice(r) => &r.meta,
            NormalizedRecord::Receipt(r) => &r.meta,
            NormalizedRecord::ProfitLoss(r) => &r.meta,
            NormalizedRecord::BalanceSheet(r) => &r.meta,
        }
    }

    pub fn id(&self) -> &str {
        &self.meta().id
    }

    pub fn date(&self) -> NaiveDate {
        self.meta().date
    }

    pub fn month(&self) -> MonthKey {
        MonthKey::from_date(self.date())
    }

    pub fn is_document_backed(&self) -> bool {
        self.meta().provenance == Provenance::DocumentBacked
    }

    pub fn is_attested(&self) -> bool {
        self.meta().attestation.is_some()
    }

    pub fn kind(&self) -> &'static str {
        match self {
            NormalizedRecord::Transaction(_) => "transaction",
            NormalizedRecord::Invoice(_) => "invoice",
            NormalizedRecord::Receipt(_) => "receipt",
            NormalizedRecord::ProfitLoss(_) => "profit_loss",
            NormalizedRecord::BalanceSheet(_) => "balance_sheet",
        }
    }

    /// The amount that best summarizes the record, if known
    pub fn primary_amount(&self) -> Option<Minor> {
        match self {
            NormalizedRecord::Transaction(r) => r.amount,
            NormalizedRecord::Invoice(r) => r.total,
            NormalizedRecord::Receipt(r) => r.total,
            NormalizedRecord::ProfitLoss(r) => r.revenue,
            NormalizedRecord::BalanceSheet(r) => r.total_assets,
        }
    }

    pub fn as_transaction(&self) -> Option<&TransactionRecord> {
        match self {
            NormalizedRecord::Transaction(tx) => Some(tx),
            _ => None,
        }
    }

    /// Content fingerprint for duplicate-upload detection
    /// NOTE: the id is deliberately left out - two uploads of the same document
    /// get different ids but identical fingerprints
    pub fn fingerprint(&self) -> String {
        let meta = self.meta();
        let mut hasher = Sha256::new();
        hasher.update(format!(
            "{}|{:?}|{}|{}",
            self.kind(),
            meta.source,
            meta.date,
            self.primary_amount()
                .map(|amount| amount.to_string())
                .unwrap_or_default()
        ));
        if let NormalizedRecord::Transaction(tx) = self {
            hasher.update(format!(
                "|{:?}|{}",
                tx.direction,
                tx.counterparty.as_deref().unwrap_or_default()
            ));
        }
        format!("{:x}", hasher.finalize())
    }
}

/// SHA-256 over ids and fingerprints, in snapshot order
pub fn snapshot_digest(records: &[NormalizedRecord]) -> String {
    let mut hasher = Sha256::new();
    for record in records {
        hasher.update(record.id().as_bytes());
        hasher.update(b":");
        hasher.update(record.fingerprint().as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// MONTH KEYS
// ============================================================================

/// Calendar month used for coverage and trend calculations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn from_date(date: NaiveDate) -> Self {
        MonthKey {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Months since year zero; consecutive months differ by exactly one
    pub fn index(&self) -> i64 {
        self.year as i64 * 12 + (self.month as i64 - 1)
    }

    pub fn from_index(index: i64) -> Self {
        MonthKey {
            year: index.div_euclid(12) as i32,
            month: index.rem_euclid(12) as u32 + 1,
        }
    }

    /// Every month from `first` to `last` inclusive (empty when inverted)
    pub fn range(first: MonthKey, last: MonthKey) -> Vec<MonthKey> {
        (first.index()..=last.index()).map(MonthKey::from_index).collect()
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

// ============================================================================
// BOUNDARY VALIDATION
// ============================================================================

/// Input problems the caller must reject before scoring
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("record at position {0} has an empty id")]
    EmptyId(usize),
    #[error("record id '{0}' appears more than once")]
    DuplicateId(String),
    #[error("record '{id}' has a negative {field}")]
    NegativeAmount { id: String, field: &'static str },
    #[error("profit & loss record '{0}' ends before it starts")]
    InvertedPeriod(String),
}

/// Check the structural contract the engine relies on
pub fn validate_records(records: &[NormalizedRecord]) -> Result<(), RecordError> {
    let mut seen = HashSet::new();

    for (position, record) in records.iter().enumerate() {
        let id = record.id();
        if id.trim().is_empty() {
            return Err(RecordError::EmptyId(position));
        }
        if !seen.insert(id) {
            return Err(RecordError::DuplicateId(id.to_string()));
        }

        for (field, amount) in non_negative_fields(record) {
            if matches!(amount, Some(value) if value < 0) {
                return Err(RecordError::NegativeAmount {
                    id: id.to_string(),
                    field,
                });
            }
        }

        if let NormalizedRecord::ProfitLoss(pl) = record {
            if let (Some(start), Some(end)) = (pl.period_start, pl.period_end) {
                if end < start {
                    return Err(RecordError::InvertedPeriod(id.to_string()));
                }
            }
        }
    }

    Ok(())
}

/// Amounts that must never be negative (equity and P&L expenses may legitimately be)
fn non_negative_fields(record: &NormalizedRecord) -> Vec<(&'static str, Option<Minor>)> {
    match record {
        NormalizedRecord::Transaction(r) => vec![("amount", r.amount)],
        NormalizedRecord::Invoice(r) => vec![("total", r.total), ("vat_amount", r.vat_amount)],
        NormalizedRecord::Receipt(r) => vec![("total", r.total), ("vat_amount", r.vat_amount)],
        NormalizedRecord::ProfitLoss(r) => vec![("revenue", r.revenue)],
        NormalizedRecord::BalanceSheet(r) => vec![
            ("total_assets", r.total_assets),
            ("total_liabilities", r.total_liabilities),
        ],
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_meta(id: &str, date: &str) -> RecordMeta {
        RecordMeta {
            id: id.to_string(),
            source: SourceType::BankStatement,
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            provenance: Provenance::DocumentBacked,
            extraction_errors: Vec::new(),
            attestation: None,
        }
    }

    fn create_test_transaction(id: &str, date: &str, amount: Option<Minor>) -> NormalizedRecord {
        NormalizedRecord::Transaction(TransactionRecord {
            meta: create_test_meta(id, date),
            direction: Direction::Credit,
            amount,
            counterparty: Some("Acme Traders".to_string()),
        })
    }

    #[test]
    fn test_deserialize_tagged_record() {
        let json = r#"{
            "kind": "invoice",
            "id": "inv-1",
            "source": "invoice",
            "date": "2025-03-04",
            "provenance": "document_backed",
            "invoice_number": "INV-001",
            "total": 150000,
            "vat_amount": null
        }"#;

        let record: NormalizedRecord = serde_json::from_str(json).unwrap();

        match &record {
            NormalizedRecord::Invoice(invoice) => {
                assert_eq!(invoice.total, Some(150000));
                assert_eq!(invoice.vat_amount, None);
                assert_eq!(invoice.invoice_number.as_deref(), Some("INV-001"));
            }
            other => panic!("expected invoice, got {:?}", other),
        }
        assert!(record.is_document_backed());
        assert_eq!(record.month(), MonthKey { year: 2025, month: 3 });
    }

    #[test]
    fn test_fingerprint_ignores_id() {
        let a = create_test_transaction("a", "2025-01-10", Some(5000));
        let b = create_test_transaction("b", "2025-01-10", Some(5000));
        let c = create_test_transaction("c", "2025-01-10", Some(5001));

        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_snapshot_digest_is_stable() {
        let records = vec![
            create_test_transaction("a", "2025-01-10", Some(5000)),
            create_test_transaction("b", "2025-02-10", None),
        ];

        assert_eq!(snapshot_digest(&records), snapshot_digest(&records.clone()));
        assert_ne!(snapshot_digest(&records), snapshot_digest(&records[..1]));
    }

    #[test]
    fn test_month_key_range_crosses_year() {
        let months = MonthKey::range(
            MonthKey { year: 2024, month: 11 },
            MonthKey { year: 2025, month: 2 },
        );

        let labels: Vec<String> = months.iter().map(|m| m.to_string()).collect();
        assert_eq!(labels, vec!["2024-11", "2024-12", "2025-01", "2025-02"]);
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(123456), "1234.56");
        assert_eq!(format_amount(5), "0.05");
        assert_eq!(format_amount(-250), "-2.50");
    }

    #[test]
    fn test_validate_rejects_duplicate_ids() {
        let records = vec![
            create_test_transaction("dup", "2025-01-10", Some(5000)),
            create_test_transaction("dup", "2025-01-11", Some(7000)),
        ];

        assert_eq!(
            validate_records(&records),
            Err(RecordError::DuplicateId("dup".to_string()))
        );
    }

    #[test]
    fn test_validate_rejects_negative_amounts() {
        let records = vec![create_test_transaction("neg", "2025-01-10", Some(-1))];

        assert!(matches!(
            validate_records(&records),
            Err(RecordError::NegativeAmount { field: "amount", .. })
        ));
    }

    #[test]
    fn test_validate_accepts_null_amounts() {
        let records = vec![create_test_transaction("null", "2025-01-10", None)];
        assert!(validate_records(&records).is_ok());
        assert!(validate_records(&[]).is_ok());
    }
}
