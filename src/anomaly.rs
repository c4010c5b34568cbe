// 🚨 Anomaly Detector - suspicious patterns in transaction data
//
// Four independent rules, each a pure function of the record set:
//   1. Amount spike:        amount > mean + k * stddev of the trailing window
//   2. Round-number bias:   too many amounts that are exact multiples of a round unit
//   3. Duplicate amount:    N+ transactions with the same amount within a few days
//   4. Unusual frequency:   a month with several times the usual transaction count

use crate::ledger::{mean, median, std_dev};
use crate::policy::AnomalyPolicy;
use crate::records::{format_amount, Direction, Minor, MonthKey, NormalizedRecord, TransactionRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// FINDINGS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    AmountSpike,
    RoundNumberBias,
    DuplicateAmount,
    UnusualFrequency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyFinding {
    #[serde(rename = "type")]
    pub anomaly_type: AnomalyType,
    pub severity: Severity,
    /// Points this finding removes from the total score (before the cap)
    pub confidence_reduction: u32,
    pub description: String,
    /// Ids of the records that triggered the finding
    pub data_points: Vec<String>,
}

// ============================================================================
// DUPLICATE CLUSTERS (shared with the evidence scorer)
// ============================================================================

/// Transactions sharing direction and amount whose dates fall inside one window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateCluster<'a> {
    pub direction: Direction,
    pub amount: Minor,
    pub members: Vec<&'a TransactionRecord>,
}

impl DuplicateCluster<'_> {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn span_days(&self) -> i64 {
        match (self.members.first(), self.members.last()) {
            (Some(first), Some(last)) => (last.meta.date - first.meta.date).num_days(),
            _ => 0,
        }
    }

    pub fn ids(&self) -> Vec<String> {
        self.members.iter().map(|tx| tx.meta.id.clone()).collect()
    }
}

/// Group transactions into same-amount clusters no wider than `window_days`
///
/// Clusters are built greedily in date order: a cluster opens at its earliest member
/// and absorbs later members while they stay within the window of that first date.
pub fn duplicate_clusters<'a>(
    transactions: &[&'a TransactionRecord],
    window_days: i64,
    min_size: usize,
) -> Vec<DuplicateCluster<'a>> {
    let mut groups: BTreeMap<(Direction, Minor), Vec<&'a TransactionRecord>> = BTreeMap::new();
    for tx in transactions {
        if let Some(amount) = tx.amount {
            groups.entry((tx.direction, amount)).or_default().push(*tx);
        }
    }

    let mut clusters = Vec::new();

    for ((direction, amount), mut members) in groups {
        members.sort_by(|a, b| {
            a.meta
                .date
                .cmp(&b.meta.date)
                .then_with(|| a.meta.id.cmp(&b.meta.id))
        });

        let mut current: Vec<&TransactionRecord> = Vec::new();
        for tx in members {
            let fits = current
                .first()
                .map(|first| (tx.meta.date - first.meta.date).num_days() <= window_days)
                .unwrap_or(true);

            if !fits {
                if current.len() >= min_size {
                    clusters.push(DuplicateCluster {
                        direction,
                        amount,
                        members: std::mem::take(&mut current),
                    });
                } else {
                    current.clear();
                }
            }
            current.push(tx);
        }

        if current.len() >= min_size {
            clusters.push(DuplicateCluster {
                direction,
                amount,
                members: current,
            });
        }
    }

    clusters
}

// ============================================================================
// ANOMALY DETECTOR
// ============================================================================

pub struct AnomalyDetector {
    policy: AnomalyPolicy,
}

impl AnomalyDetector {
    pub fn new(policy: AnomalyPolicy) -> Self {
        AnomalyDetector { policy }
    }

    pub fn policy(&self) -> &AnomalyPolicy {
        &self.policy
    }

    /// Run every rule; findings are ordered by rule, then by date
    pub fn detect(&self, records: &[NormalizedRecord]) -> Vec<AnomalyFinding> {
        let mut transactions: Vec<&TransactionRecord> =
            records.iter().filter_map(NormalizedRecord::as_transaction).collect();
        transactions.sort_by(|a, b| {
            a.meta
                .date
                .cmp(&b.meta.date)
                .then_with(|| a.meta.id.cmp(&b.meta.id))
        });

        let mut findings = Vec::new();
        findings.extend(self.detect_amount_spikes(&transactions));
        findings.extend(self.detect_round_number_bias(&transactions));
        findings.extend(self.detect_duplicate_amounts(&transactions));
        findings.extend(self.detect_unusual_frequency(&transactions));

        tracing::debug!(
            transactions = transactions.len(),
            findings = findings.len(),
            "anomaly scan finished"
        );

        findings
    }

    fn reduction_for(&self, severity: Severity) -> u32 {
        match severity {
            Severity::Low => self.policy.low_reduction,
            Severity::Medium => self.policy.medium_reduction,
            Severity::High => self.policy.high_reduction,
        }
    }

    /// Rule 1: Amount Spike
    /// Compared against the trailing window of the same direction only, so a large
    /// supplier payment is never measured against small customer deposits
    fn detect_amount_spikes(&self, transactions: &[&TransactionRecord]) -> Vec<AnomalyFinding> {
        let mut findings = Vec::new();

        for direction in [Direction::Credit, Direction::Debit] {
            let series: Vec<(&TransactionRecord, Minor)> = transactions
                .iter()
                .filter(|tx| tx.direction == direction)
                .filter_map(|tx| tx.amount.map(|amount| (*tx, amount)))
                .collect();

            for i in 0..series.len() {
                if i < self.policy.spike_min_window {
                    continue;
                }

                let start = i.saturating_sub(self.policy.spike_window);
                let trailing: Vec<f64> = series[start..i]
                    .iter()
                    .map(|(_, amount)| *amount as f64)
                    .collect();

                let m = mean(&trailing);
                // A flat window has zero spread; fall back to 5% of the mean
                let spread = std_dev(&trailing).max(m * 0.05).max(1.0);
                let threshold = m + self.policy.spike_k * spread;

                let (tx, amount) = series[i];
                let value = amount as f64;
                if value <= threshold {
                    continue;
                }

                let deviations = (value - m) / spread;
                let severity = if deviations >= self.policy.spike_k * 2.0 {
                    Severity::High
                } else {
                    Severity::Medium
                };

                findings.push(AnomalyFinding {
                    anomaly_type: AnomalyType::AmountSpike,
                    severity,
                    confidence_reduction: self.reduction_for(severity),
                    description: format!(
                        "{} of {} on {} is {:.1} standard deviations above the trailing average of {}",
                        direction_label(direction),
                        format_amount(amount),
                        tx.meta.date,
                        deviations,
                        format_amount(m.round() as Minor)
                    ),
                    data_points: vec![tx.meta.id.clone()],
                });
            }
        }

        findings
    }

    /// Rule 2: Round-Number Bias
    /// Below the minimum sample size there is not enough data to judge: no finding
    fn detect_round_number_bias(&self, transactions: &[&TransactionRecord]) -> Vec<AnomalyFinding> {
        let sample: Vec<(&TransactionRecord, Minor)> = transactions
            .iter()
            .filter_map(|tx| tx.amount.map(|amount| (*tx, amount)))
            .filter(|(_, amount)| *amount > 0)
            .collect();

        if sample.len() < self.policy.round_min_sample || self.policy.round_unit <= 0 {
            return Vec::new();
        }

        let round: Vec<&TransactionRecord> = sample
            .iter()
            .filter(|(_, amount)| amount % self.policy.round_unit == 0)
            .map(|(tx, _)| *tx)
            .collect();

        let fraction = round.len() as f64 / sample.len() as f64;
        if fraction <= self.policy.round_fraction {
            return Vec::new();
        }

        let severity = if fraction >= self.policy.round_high_fraction {
            Severity::High
        } else {
            Severity::Medium
        };

        vec![AnomalyFinding {
            anomaly_type: AnomalyType::RoundNumberBias,
            severity,
            confidence_reduction: self.reduction_for(severity),
            description: format!(
                "{:.0}% of {} transactions are exact multiples of {} (threshold {:.0}%)",
                fraction * 100.0,
                sample.len(),
                format_amount(self.policy.round_unit),
                self.policy.round_fraction * 100.0
            ),
            data_points: round.iter().map(|tx| tx.meta.id.clone()).collect(),
        }]
    }

    /// Rule 3: Duplicate Amount
    fn detect_duplicate_amounts(&self, transactions: &[&TransactionRecord]) -> Vec<AnomalyFinding> {
        let mut clusters = duplicate_clusters(
            transactions,
            self.policy.duplicate_window_days,
            self.policy.duplicate_group_size,
        );
        clusters.sort_by(|a, b| {
            a.members[0]
                .meta
                .date
                .cmp(&b.members[0].meta.date)
                .then_with(|| a.amount.cmp(&b.amount))
        });

        clusters
            .iter()
            .map(|cluster| {
                let severity = if cluster.len() >= self.policy.duplicate_high_group_size {
                    Severity::High
                } else {
                    Severity::Medium
                };

                AnomalyFinding {
                    anomaly_type: AnomalyType::DuplicateAmount,
                    severity,
                    confidence_reduction: self.reduction_for(severity),
                    description: format!(
                        "{} {}s of exactly {} within {} day(s)",
                        cluster.len(),
                        direction_label(cluster.direction),
                        format_amount(cluster.amount),
                        cluster.span_days()
                    ),
                    data_points: cluster.ids(),
                }
            })
            .collect()
    }

    /// Rule 4: Unusual Frequency
    fn detect_unusual_frequency(&self, transactions: &[&TransactionRecord]) -> Vec<AnomalyFinding> {
        let mut by_month: BTreeMap<MonthKey, Vec<&TransactionRecord>> = BTreeMap::new();
        for tx in transactions {
            by_month
                .entry(MonthKey::from_date(tx.meta.date))
                .or_default()
                .push(*tx);
        }

        if by_month.len() < self.policy.frequency_min_months {
            return Vec::new();
        }

        let counts: Vec<f64> = by_month.values().map(|txs| txs.len() as f64).collect();
        let typical = median(&counts);
        let threshold = typical * self.policy.frequency_multiplier;

        by_month
            .iter()
            .filter(|(_, txs)| {
                txs.len() >= self.policy.frequency_min_count && txs.len() as f64 >= threshold
            })
            .map(|(month, txs)| {
                let severity = if txs.len() as f64 >= threshold * 2.0 {
                    Severity::Medium
                } else {
                    Severity::Low
                };

                AnomalyFinding {
                    anomaly_type: AnomalyType::UnusualFrequency,
                    severity,
                    confidence_reduction: self.reduction_for(severity),
                    description: format!(
                        "{} transactions in {} against a typical {:.0} per month",
                        txs.len(),
                        month,
                        typical
                    ),
                    data_points: txs.iter().map(|tx| tx.meta.id.clone()).collect(),
                }
            })
            .collect()
    }
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new(AnomalyPolicy::default())
    }
}

fn direction_label(direction: Direction) -> &'static str {
    match direction {
        Direction::Credit => "deposit",
        Direction::Debit => "payment",
    }
}

// ============================================================================
// TESTS
// ============================================================================
