// 📈 Stability & Growth Scorer - monthly revenue, cashflow and expense behaviour
//
// All five sub-metrics read from one monthly ledger. A metric without enough months of
// data scores 0 and carries an info flag instead of guessing.

use crate::layer::{fold_layer, fraction_score, Effort, LayerScore, MetricSpec, ScoreFlag};
use crate::ledger::{linear_slope, mean, std_dev, MonthlyLedger};
use crate::policy::StabilityPolicy;
use crate::records::NormalizedRecord;
use std::collections::BTreeMap;

/// One measured sub-metric; `value` is None when the data is insufficient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricReading {
    pub value: Option<u8>,
    pub detail: String,
}

impl MetricReading {
    fn measured(value: u8, detail: impl Into<String>) -> Self {
        MetricReading {
            value: Some(value),
            detail: detail.into(),
        }
    }

    fn insufficient(months: usize) -> Self {
        MetricReading {
            value: None,
            detail: format!("not enough monthly data ({} month(s) observed)", months),
        }
    }

    fn score(&self) -> u8 {
        self.value.unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StabilitySignals {
    pub months: usize,
    pub revenue_stability: MetricReading,
    pub cashflow_health: MetricReading,
    pub expense_discipline: MetricReading,
    pub growth_trend: MetricReading,
    pub seasonality: MetricReading,
}

pub struct StabilityScorer {
    policy: StabilityPolicy,
    suggest_below: u8,
}

impl StabilityScorer {
    pub fn new(policy: StabilityPolicy, suggest_below: u8) -> Self {
        StabilityScorer {
            policy,
            suggest_below,
        }
    }

    fn table(&self) -> Vec<MetricSpec<StabilitySignals>> {
        let w = &self.policy.weights;
        vec![
            MetricSpec {
                name: "revenueStability",
                weight: w.revenue_stability,
                extract: |s| s.revenue_stability.score(),
                effort: Effort::High,
                action: "Smooth out monthly revenue",
                suggestion: "Diversify customers or move to recurring contracts to reduce month-to-month swings",
            },
            MetricSpec {
                name: "cashflowHealth",
                weight: w.cashflow_health,
                extract: |s| s.cashflow_health.score(),
                effort: Effort::Medium,
                action: "Keep monthly cashflow positive",
                suggestion: "Align payment terms so outflows do not exceed inflows in most months",
            },
            MetricSpec {
                name: "expenseDiscipline",
                weight: w.expense_discipline,
                extract: |s| s.expense_discipline.score(),
                effort: Effort::Medium,
                action: "Bring expenses in line with revenue",
                suggestion: "Review recurring costs; expenses are taking a large or growing share of revenue",
            },
            MetricSpec {
                name: "growthTrend",
                weight: w.growth_trend,
                extract: |s| s.growth_trend.score(),
                effort: Effort::High,
                action: "Show a sustained revenue trend",
                suggestion: "Keep uploading monthly records so growth can be demonstrated over time",
            },
            MetricSpec {
                name: "seasonalityHandling",
                weight: w.seasonality,
                extract: |s| s.seasonality.score(),
                effort: Effort::Low,
                action: "Document seasonal slowdowns",
                suggestion: "Declare the months with a known seasonal slowdown so dips are not read as volatility",
            },
        ]
    }

    pub fn signals(&self, ledger: &MonthlyLedger) -> StabilitySignals {
        StabilitySignals {
            months: ledger.len(),
            revenue_stability: self.revenue_stability(ledger),
            cashflow_health: self.cashflow_health(ledger),
            expense_discipline: self.expense_discipline(ledger),
            growth_trend: self.growth_trend(ledger),
            seasonality: self.seasonality(ledger),
        }
    }

    pub fn score(&self, records: &[NormalizedRecord]) -> LayerScore {
        let ledger = MonthlyLedger::from_records(records);
        let signals = self.signals(&ledger);

        let readings = [
            ("Revenue stability", &signals.revenue_stability),
            ("Cashflow health", &signals.cashflow_health),
            ("Expense discipline", &signals.expense_discipline),
            ("Growth trend", &signals.growth_trend),
            ("Seasonality handling", &signals.seasonality),
        ];
        let flags = readings
            .iter()
            .map(|(label, reading)| self.flag_for(label, reading))
            .collect();

        let layer = fold_layer(&self.table(), &signals, flags, self.suggest_below);

        tracing::debug!(
            score = layer.score,
            months = signals.months,
            basis = ?ledger.basis(),
            "stability and growth scored"
        );

        layer
    }

    fn flag_for(&self, label: &str, reading: &MetricReading) -> ScoreFlag {
        let message = format!("{}: {}", label, reading.detail);
        match reading.value {
            None => ScoreFlag::info(message),
            Some(value) if value >= 70 => ScoreFlag::positive(message),
            Some(value) if value >= 40 => {
                ScoreFlag::warning(message, self.policy.warning_flag_impact)
            }
            Some(_) => ScoreFlag::critical(message, self.policy.critical_flag_impact),
        }
    }

    /// 100 x (1 - coefficient of variation)
    fn revenue_stability(&self, ledger: &MonthlyLedger) -> MetricReading {
        let revenues = ledger.revenues();
        if revenues.len() < 2 {
            return MetricReading::insufficient(revenues.len());
        }

        let m = mean(&revenues);
        if m <= 0.0 {
            return MetricReading::measured(0, "no revenue recorded");
        }
        let cv = std_dev(&revenues) / m;
        MetricReading::measured(
            fraction_score(1.0 - cv),
            format!("monthly revenue varies by {:.0}% around its mean", cv * 100.0),
        )
    }

    fn cashflow_health(&self, ledger: &MonthlyLedger) -> MetricReading {
        if ledger.is_empty() {
            return MetricReading::insufficient(0);
        }

        let positive = ledger.flows().iter().filter(|flow| flow.net() >= 0).count();
        let share = positive as f64 / ledger.len() as f64;
        let value = if share >= self.policy.positive_month_target {
            100
        } else {
            fraction_score(share / self.policy.positive_month_target)
        };
        MetricReading::measured(
            value,
            format!(
                "net cashflow non-negative in {} of {} month(s)",
                positive,
                ledger.len()
            ),
        )
    }

    /// Level of the expense/revenue ratio, minus a penalty when the ratio is rising
    fn expense_discipline(&self, ledger: &MonthlyLedger) -> MetricReading {
        let (offsets, ratios): (Vec<f64>, Vec<f64>) = ledger
            .flows()
            .iter()
            .zip(ledger.month_offsets())
            .filter(|(flow, _)| flow.inflow > 0)
            .map(|(flow, offset)| (offset, flow.outflow as f64 / flow.inflow as f64))
            .unzip();

        if ratios.is_empty() {
            return MetricReading::insufficient(0);
        }

        let floor = self.policy.expense_ratio_floor;
        let ceiling = self.policy.expense_ratio_ceiling;
        let average = mean(&ratios);
        let level = if average <= floor {
            100.0
        } else if average >= ceiling {
            0.0
        } else {
            (ceiling - average) / (ceiling - floor) * 100.0
        };

        let slope = if ratios.len() >= self.policy.min_months_for_trend {
            linear_slope(&offsets, &ratios)
        } else {
            0.0
        };
        let penalty = if slope > 0.0 {
            (slope * self.policy.rising_ratio_penalty).min(self.policy.max_rising_ratio_penalty)
        } else {
            0.0
        };

        let value = (level - penalty).round().clamp(0.0, 100.0) as u8;
        let trend = if slope > 0.0 { "rising" } else { "steady or falling" };
        MetricReading::measured(
            value,
            format!(
                "expenses average {:.0}% of revenue and the ratio is {}",
                average * 100.0,
                trend
            ),
        )
    }

    /// Linear trend of monthly revenue, relative to mean revenue
    fn growth_trend(&self, ledger: &MonthlyLedger) -> MetricReading {
        if ledger.len() < self.policy.min_months_for_trend {
            return MetricReading::insufficient(ledger.len());
        }

        let revenues = ledger.revenues();
        let m = mean(&revenues);
        if m <= 0.0 {
            return MetricReading::measured(0, "no revenue recorded");
        }
        let rate = linear_slope(&ledger.month_offsets(), &revenues) / m;

        MetricReading::measured(
            growth_score(rate),
            format!("revenue trend of {:+.1}% per month", rate * 100.0),
        )
    }

    /// Dips that recur in the same calendar month, or fall in a declared slow month,
    /// are explained; the rest count as volatility
    fn seasonality(&self, ledger: &MonthlyLedger) -> MetricReading {
        if ledger.len() < self.policy.min_months_for_trend {
            return MetricReading::insufficient(ledger.len());
        }

        let revenues = ledger.revenues();
        let m = mean(&revenues);
        if m <= 0.0 {
            return MetricReading::measured(0, "no revenue recorded");
        }
        let dip_below = (1.0 - self.policy.seasonal_dip_threshold) * m;

        let dips: Vec<_> = ledger
            .flows()
            .iter()
            .filter(|flow| (flow.inflow as f64) < dip_below)
            .map(|flow| flow.month)
            .collect();

        if dips.is_empty() {
            return MetricReading::measured(100, "no revenue dips");
        }

        let mut dip_years_by_month: BTreeMap<u32, usize> = BTreeMap::new();
        for month in &dips {
            *dip_years_by_month.entry(month.month).or_insert(0) += 1;
        }

        let unexplained = dips
            .iter()
            .filter(|month| {
                !self.policy.known_seasonal_months.contains(&month.month)
                    && dip_years_by_month.get(&month.month).copied().unwrap_or(0) < 2
            })
            .count();

        let value = fraction_score(1.0 - 2.0 * unexplained as f64 / ledger.len() as f64);
        MetricReading::measured(
            value,
            format!(
                "{} revenue dip(s), {} without a seasonal explanation",
                dips.len(),
                unexplained
            ),
        )
    }
}

impl Default for StabilityScorer {
    fn default() -> Self {
        Self::new(StabilityPolicy::default(), 80)
    }
}

/// Map a monthly growth rate onto 0..=100
///
///   <= -5%      0
///   -5% .. 0%   0 .. 40
///   0% .. 3%    40 .. 80
///   3% .. 10%   80 .. 100
///   >= 10%      100
pub fn growth_score(rate: f64) -> u8 {
    if !rate.is_finite() {
        return 0;
    }
    let value = if rate <= -0.05 {
        0.0
    } else if rate < 0.0 {
        40.0 * (rate + 0.05) / 0.05
    } else if rate < 0.03 {
        40.0 + 40.0 * rate / 0.03
    } else if rate < 0.10 {
        80.0 + 20.0 * (rate - 0.03) / 0.07
    } else {
        100.0
    };
    value.round().clamp(0.0, 100.0) as u8
}

// ============================================================================
// TESTS
// ============================================================================
