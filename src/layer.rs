// 🧮 Layer Scores - weighted metric tables folded with flags
//
// Each scoring layer is a small table of {metric, weight, extractor}. The table is
// evaluated once against the layer's signals, then flag impacts are folded in and the
// result is clamped to 0..=100.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// FLAGS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagKind {
    Positive,
    Warning,
    Critical,
    Info,
}

/// Diagnostic attached to a layer; a non-zero impact also moves the layer score
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreFlag {
    #[serde(rename = "type")]
    pub kind: FlagKind,
    pub message: String,
    pub impact: i32,
}

impl ScoreFlag {
    pub fn positive(message: impl Into<String>) -> Self {
        ScoreFlag {
            kind: FlagKind::Positive,
            message: message.into(),
            impact: 0,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        ScoreFlag {
            kind: FlagKind::Info,
            message: message.into(),
            impact: 0,
        }
    }

    pub fn warning(message: impl Into<String>, impact: i32) -> Self {
        ScoreFlag {
            kind: FlagKind::Warning,
            message: message.into(),
            impact,
        }
    }

    pub fn critical(message: impl Into<String>, impact: i32) -> Self {
        ScoreFlag {
            kind: FlagKind::Critical,
            message: message.into(),
            impact,
        }
    }
}

// ============================================================================
// ACTION TAGS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionCategory {
    Evidence,
    Stability,
    Compliance,
    Verification,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effort {
    Low,
    Medium,
    High,
}

// ============================================================================
// FACTORS & LAYER SCORE
// ============================================================================

/// One evaluated metric of a layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreFactor {
    pub metric: String,
    pub weight: u8,
    pub score: u8,
    pub max_score: u8,
    pub effort: Effort,
    /// Short imperative title used when this factor becomes an action
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl ScoreFactor {
    pub fn gap(&self) -> u8 {
        self.max_score.saturating_sub(self.score)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerScore {
    pub score: u8,
    /// metric name -> value, the compact view consumers display
    pub sub_metrics: BTreeMap<String, u8>,
    pub factors: Vec<ScoreFactor>,
    pub flags: Vec<ScoreFlag>,
}

impl LayerScore {
    /// Sub-metric value by name
    pub fn metric(&self, name: &str) -> Option<u8> {
        self.factors
            .iter()
            .find(|factor| factor.metric == name)
            .map(|factor| factor.score)
    }

    /// Weighted sum before flag impacts
    pub fn weighted_base(&self) -> u8 {
        weighted_sum(&self.factors)
    }

    pub fn total_impact(&self) -> i32 {
        self.flags.iter().map(|flag| flag.impact).sum()
    }

    pub fn has_critical(&self) -> bool {
        self.flags.iter().any(|flag| flag.kind == FlagKind::Critical)
    }
}

// ============================================================================
// METRIC TABLES
// ============================================================================

/// Declarative row of a layer's metric table
pub struct MetricSpec<S> {
    pub name: &'static str,
    pub weight: u8,
    pub extract: fn(&S) -> u8,
    pub effort: Effort,
    pub action: &'static str,
    pub suggestion: &'static str,
}

/// Evaluate a metric table and fold the flags into a clamped layer score
pub fn fold_layer<S>(
    table: &[MetricSpec<S>],
    signals: &S,
    flags: Vec<ScoreFlag>,
    suggest_below: u8,
) -> LayerScore {
    let factors: Vec<ScoreFactor> = table
        .iter()
        .map(|spec| {
            let score = (spec.extract)(signals).min(100);
            ScoreFactor {
                metric: spec.name.to_string(),
                weight: spec.weight,
                score,
                max_score: 100,
                effort: spec.effort,
                action: spec.action.to_string(),
                suggestion: (score < suggest_below).then(|| spec.suggestion.to_string()),
            }
        })
        .collect();

    let base = weighted_sum(&factors) as i32;
    let impact: i32 = flags.iter().map(|flag| flag.impact).sum();
    let score = (base + impact).clamp(0, 100) as u8;

    let sub_metrics = factors
        .iter()
        .map(|factor| (factor.metric.clone(), factor.score))
        .collect();

    LayerScore {
        score,
        sub_metrics,
        factors,
        flags,
    }
}

/// Integer weighted sum with half-up rounding; weights are percentages
fn weighted_sum(factors: &[ScoreFactor]) -> u8 {
    let total: u32 = factors
        .iter()
        .map(|factor| factor.weight as u32 * factor.score as u32)
        .sum();
    ((total + 50) / 100).min(100) as u8
}

/// Convert a 0.0..=1.0 fraction to a 0..=100 score (NaN and negatives become 0)
pub fn fraction_score(fraction: f64) -> u8 {
    if !fraction.is_finite() || fraction <= 0.0 {
        return 0;
    }
    (fraction * 100.0).round().min(100.0) as u8
}

/// part / whole as a 0..=100 score, defined as 0 when whole is 0
pub fn ratio_score(part: usize, whole: usize) -> u8 {
    if whole == 0 {
        return 0;
    }
    fraction_score(part as f64 / whole as f64)
}

// ============================================================================
// TESTS
// ============================================================================
