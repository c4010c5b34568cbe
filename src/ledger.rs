// 📒 Monthly Ledger - inflow/outflow per observed month
//
// Revenue and cost series come from one source only, to avoid counting the same
// money twice: transactions when any carry an amount, otherwise invoices and
// receipts, otherwise profit & loss statements.

use crate::records::{Direction, Minor, MonthKey, NormalizedRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerBasis {
    Transactions,
    Documents,
    Statements,
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyFlow {
    pub month: MonthKey,
    pub inflow: Minor,
    pub outflow: Minor,
}

impl MonthlyFlow {
    pub fn net(&self) -> Minor {
        self.inflow.saturating_sub(self.outflow)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyLedger {
    basis: LedgerBasis,
    flows: Vec<MonthlyFlow>,
}

impl MonthlyLedger {
    pub fn from_records(records: &[NormalizedRecord]) -> Self {
        let mut by_month: BTreeMap<MonthKey, (Minor, Minor)> = BTreeMap::new();

        let has_transactions = records.iter().any(|record| {
            matches!(record, NormalizedRecord::Transaction(tx) if tx.amount.is_some())
        });
        let has_documents = records.iter().any(|record| match record {
            NormalizedRecord::Invoice(invoice) => invoice.total.is_some(),
            NormalizedRecord::Receipt(receipt) => receipt.total.is_some(),
            _ => false,
        });
        let has_statements = records.iter().any(|record| {
            matches!(record, NormalizedRecord::ProfitLoss(pl) if pl.revenue.is_some() || pl.expenses.is_some())
        });

        let basis = if has_transactions {
            LedgerBasis::Transactions
        } else if has_documents {
            LedgerBasis::Documents
        } else if has_statements {
            LedgerBasis::Statements
        } else {
            LedgerBasis::Empty
        };

        for record in records {
            let (inflow, outflow) = match (basis, record) {
                (LedgerBasis::Transactions, NormalizedRecord::Transaction(tx)) => {
                    match (tx.direction, tx.amount) {
                        (Direction::Credit, Some(amount)) => (Some(amount), None),
                        (Direction::Debit, Some(amount)) => (None, Some(amount)),
                        _ => (None, None),
                    }
                }
                (LedgerBasis::Documents, NormalizedRecord::Invoice(invoice)) => {
                    (invoice.total, None)
                }
                (LedgerBasis::Documents, NormalizedRecord::Receipt(receipt)) => {
                    (None, receipt.total)
                }
                (LedgerBasis::Statements, NormalizedRecord::ProfitLoss(pl)) => {
                    (pl.revenue, pl.expenses)
                }
                _ => (None, None),
            };

            if inflow.is_none() && outflow.is_none() {
                continue;
            }

            let entry = by_month.entry(record.month()).or_insert((0, 0));
            entry.0 = entry.0.saturating_add(inflow.unwrap_or(0));
            entry.1 = entry.1.saturating_add(outflow.unwrap_or(0));
        }

        let flows = by_month
            .into_iter()
            .map(|(month, (inflow, outflow))| MonthlyFlow {
                month,
                inflow,
                outflow,
            })
            .collect();

        MonthlyLedger { basis, flows }
    }

    pub fn basis(&self) -> LedgerBasis {
        self.basis
    }

    /// Observed months in chronological order
    pub fn flows(&self) -> &[MonthlyFlow] {
        &self.flows
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    pub fn revenues(&self) -> Vec<f64> {
        self.flows.iter().map(|flow| flow.inflow as f64).collect()
    }

    /// Month offsets from the first observed month (gaps keep their distance)
    pub fn month_offsets(&self) -> Vec<f64> {
        let first = match self.flows.first() {
            Some(flow) => flow.month.index(),
            None => return Vec::new(),
        };
        self.flows
            .iter()
            .map(|flow| (flow.month.index() - first) as f64)
            .collect()
    }
}

// ============================================================================
// STATISTICS
// ============================================================================

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation; 0 for fewer than two values
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Least-squares slope of ys over xs; 0 when undefined
pub fn linear_slope(xs: &[f64], ys: &[f64]) -> f64 {
    if xs.len() != ys.len() || xs.len() < 2 {
        return 0.0;
    }
    let mx = mean(xs);
    let my = mean(ys);
    let numerator: f64 = xs.iter().zip(ys).map(|(x, y)| (x - mx) * (y - my)).sum();
    let denominator: f64 = xs.iter().map(|x| (x - mx).powi(2)).sum();
    if denominator == 0.0 {
        return 0.0;
    }
    numerator / denominator
}

// ============================================================================
// TESTS
// ============================================================================
