// 📥 Snapshot Loader - read record snapshots from disk for the CLI and server
//
// Two formats:
//   .json   array of tagged NormalizedRecord values, as the extraction service emits them
//   .csv    a plain transaction table (one row per bank line)

use crate::records::{Direction, Minor, NormalizedRecord, Provenance, RecordMeta, SourceType, TransactionRecord};
use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Load a snapshot, choosing the format from the file extension
pub fn load_snapshot(path: &Path) -> Result<Vec<NormalizedRecord>> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("json") => load_records_json(path),
        Some("csv") => load_transactions_csv(path),
        _ => bail!(
            "Unsupported snapshot format: {:?} (expected .json or .csv)",
            path
        ),
    }
}

pub fn load_records_json(path: &Path) -> Result<Vec<NormalizedRecord>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot file: {:?}", path))?;

    let records: Vec<NormalizedRecord> =
        serde_json::from_str(&content).context("Failed to parse snapshot JSON")?;

    tracing::debug!(records = records.len(), path = ?path, "loaded JSON snapshot");
    Ok(records)
}

// ============================================================================
// CSV TRANSACTION TABLES
// ============================================================================

/// One row of a transaction table; every column except `date` is optional
#[derive(Debug, Deserialize)]
struct TransactionRow {
    #[serde(default)]
    id: Option<String>,
    date: String,
    #[serde(default)]
    direction: Option<String>,
    /// Major units as written on the statement, e.g. "1,250.00" or "-80.5"
    #[serde(default)]
    amount: Option<String>,
    #[serde(default)]
    counterparty: Option<String>,
    #[serde(default)]
    source: Option<SourceType>,
    #[serde(default)]
    provenance: Option<Provenance>,
}

pub fn load_transactions_csv(path: &Path) -> Result<Vec<NormalizedRecord>> {
    let mut rdr = csv::Reader::from_path(path).context("Failed to open CSV file")?;

    let mut records = Vec::new();

    for (index, result) in rdr.deserialize().enumerate() {
        // header is line 1
        let line = index + 2;
        let row: TransactionRow =
            result.with_context(|| format!("Failed to deserialize row at line {}", line))?;
        records.push(row_to_record(row).with_context(|| format!("Invalid row at line {}", line))?);
    }

    tracing::debug!(records = records.len(), path = ?path, "loaded CSV transaction table");
    Ok(records)
}

fn row_to_record(row: TransactionRow) -> Result<NormalizedRecord> {
    let signed = match row.amount.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => Some(parse_amount(text)?),
        _ => None,
    };

    let direction = match row.direction.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => parse_direction(text)?,
        _ if matches!(signed, Some(amount) if amount < 0) => Direction::Debit,
        _ => Direction::Credit,
    };

    let id = row
        .id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    Ok(NormalizedRecord::Transaction(TransactionRecord {
        meta: RecordMeta {
            id,
            source: row.source.unwrap_or(SourceType::BankStatement),
            date: parse_date(&row.date)?,
            provenance: row.provenance.unwrap_or(Provenance::DocumentBacked),
            extraction_errors: Vec::new(),
            attestation: None,
        },
        direction,
        amount: signed.map(Minor::abs),
        counterparty: row
            .counterparty
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty()),
    }))
}

/// Parse a major-unit amount ("1,234.5", "-80", "$12.00") into minor units
pub fn parse_amount(text: &str) -> Result<Minor> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();

    let (negative, digits) = match cleaned.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, cleaned.as_str()),
    };

    let (whole, fraction) = match digits.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (digits, ""),
    };
    let all_digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
    if fraction.len() > 2
        || (whole.is_empty() && fraction.is_empty())
        || !all_digits(whole)
        || !all_digits(fraction)
    {
        bail!("Invalid amount: {:?}", text);
    }

    let invalid = || anyhow!("Invalid amount: {:?}", text);
    let whole: Minor = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid())?
    };
    let cents: Minor = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<Minor>().map_err(|_| invalid())? * 10,
        _ => fraction.parse().map_err(|_| invalid())?,
    };

    let minor = whole
        .checked_mul(100)
        .and_then(|units| units.checked_add(cents))
        .ok_or_else(invalid)?;
    Ok(if negative { -minor } else { minor })
}

fn parse_direction(text: &str) -> Result<Direction> {
    match text.to_ascii_lowercase().as_str() {
        "credit" | "cr" | "deposit" | "in" => Ok(Direction::Credit),
        "debit" | "dr" | "payment" | "out" => Ok(Direction::Debit),
        other => bail!("Unknown direction: {:?}", other),
    }
}

fn parse_date(text: &str) -> Result<NaiveDate> {
    let text = text.trim();
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(text, "%d/%m/%Y"))
        .with_context(|| format!("Invalid date: {:?} (expected YYYY-MM-DD or DD/MM/YYYY)", text))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn create_test_file(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1,234.56").unwrap(), 123_456);
        assert_eq!(parse_amount("-80.5").unwrap(), -8_050);
        assert_eq!(parse_amount("$12").unwrap(), 1_200);
        assert_eq!(parse_amount(".75").unwrap(), 75);
        assert!(parse_amount("1.234").is_err());
        assert!(parse_amount("abc").is_err());
    }

    #[test]
    fn test_parse_amount_rejects_signed_fraction_and_overflow() {
        assert!(parse_amount("1.-5").is_err());
        assert!(parse_amount("12-3.00").is_err());
        assert!(parse_amount("999999999999999999").is_err());
        assert!(parse_amount("99999999999999999999").is_err());
        assert_eq!(
            parse_amount("92233720368547758.07").unwrap(),
            i64::MAX
        );
    }

    #[test]
    fn test_load_csv_with_defaults() {
        let file = create_test_file(
            ".csv",
            "id,date,direction,amount,counterparty\n\
             tx-1,2025-01-10,credit,\"1,500.00\",Acme Traders\n\
             ,2025-01-12,,-250.00,\n\
             tx-3,14/01/2025,debit,,Landlord\n",
        );

        let records = load_snapshot(file.path()).unwrap();

        assert_eq!(records.len(), 3);

        let first = records[0].as_transaction().unwrap();
        assert_eq!(first.meta.id, "tx-1");
        assert_eq!(first.amount, Some(150_000));
        assert_eq!(first.meta.source, SourceType::BankStatement);
        assert_eq!(first.counterparty.as_deref(), Some("Acme Traders"));

        let second = records[1].as_transaction().unwrap();
        assert!(uuid::Uuid::parse_str(&second.meta.id).is_ok());
        assert_eq!(second.direction, Direction::Debit);
        assert_eq!(second.amount, Some(25_000));
        assert_eq!(second.counterparty, None);

        let third = records[2].as_transaction().unwrap();
        assert_eq!(third.amount, None);
        assert_eq!(third.meta.date, NaiveDate::from_ymd_opt(2025, 1, 14).unwrap());
    }

    #[test]
    fn test_load_csv_reports_bad_line() {
        let file = create_test_file(
            ".csv",
            "date,direction,amount\n2025-01-10,credit,10.00\n2025-13-45,credit,10.00\n",
        );

        let err = load_transactions_csv(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("line 3"));
    }

    #[test]
    fn test_load_json_snapshot() {
        let file = create_test_file(
            ".json",
            r#"[
                {"kind": "transaction", "id": "t1", "source": "bank_statement",
                 "date": "2025-02-01", "provenance": "document_backed",
                 "direction": "credit", "amount": 5000},
                {"kind": "balance_sheet", "id": "b1", "source": "balance_sheet",
                 "date": "2024-12-31", "provenance": "manual_entry",
                 "total_assets": null, "total_liabilities": 100, "equity": null}
            ]"#,
        );

        let records = load_snapshot(file.path()).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[1].kind(), "balance_sheet");
        assert!(!records[1].is_document_backed());
    }

    #[test]
    fn test_unknown_extension_is_rejected() {
        let file = create_test_file(".xml", "<records/>");
        assert!(load_snapshot(file.path()).is_err());
    }
}
