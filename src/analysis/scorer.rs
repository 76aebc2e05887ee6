//! Anomaly scoring.
//!
//! Turns one evaluator's pair counts into flagged pairs. The threshold is
//! derived from the evaluator's level, and each count is adjusted by how
//! concentrated the evaluator's activity is on that single peer.

use std::collections::BTreeMap;
use std::fmt;

use super::aggregator::total_activity;

/// Evaluators at or below this level get the fixed low-level allowance.
const LOW_LEVEL_CUTOFF: f64 = 2.0;
/// Threshold for evaluators at or below [`LOW_LEVEL_CUTOFF`].
const LOW_LEVEL_THRESHOLD: i64 = 3;
/// Total activity above which the concentration penalty applies.
const MIN_SAMPLE: i64 = 11;
/// Share of total activity above which a pair counts as concentrated.
const CONCENTRATION: f64 = 0.10;
const CONCENTRATED_PENALTY: i64 = 5;
const SPREAD_PENALTY: i64 = -2;

/// Default pass mark: only a full validation counts as a pass.
pub const DEFAULT_PASS_MARK: i64 = 100;
/// Default threshold of [`FlagRule::Fixed`].
pub const DEFAULT_FIXED_THRESHOLD: i64 = 2;

/// How the flag threshold is chosen and compared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FlagRule {
    /// Threshold from the evaluator's level, flag when `adjusted > threshold`.
    #[default]
    LevelScaled,
    /// Constant threshold, flag when `adjusted >= threshold`.
    Fixed { threshold: i64 },
}

impl fmt::Display for FlagRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagRule::LevelScaled => write!(f, "level-scaled threshold (adjusted > threshold)"),
            FlagRule::Fixed { threshold } => {
                write!(f, "fixed threshold {} (adjusted >= threshold)", threshold)
            }
        }
    }
}

/// Scoring policy selected by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoringPolicy {
    /// Minimum final mark counted as a validation.
    pub pass_mark: i64,
    pub flag_rule: FlagRule,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            pass_mark: DEFAULT_PASS_MARK,
            flag_rule: FlagRule::default(),
        }
    }
}

impl fmt::Display for ScoringPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pass mark {}, {}", self.pass_mark, self.flag_rule)
    }
}

/// Flag threshold for an evaluator of the given level.
///
/// Levels round half to even, so 3.5 yields 2 and 4.5 yields 4.
pub fn level_threshold(level: f64) -> i64 {
    if level <= LOW_LEVEL_CUTOFF {
        LOW_LEVEL_THRESHOLD
    } else {
        (level - 1.0).round_ties_even() as i64
    }
}

/// Concentration penalty for a pair holding `percentage` of `total`.
pub fn concentration_penalty(total: i64, percentage: f64) -> i64 {
    if total <= MIN_SAMPLE {
        0
    } else if percentage > CONCENTRATION {
        CONCENTRATED_PENALTY
    } else {
        SPREAD_PENALTY
    }
}

/// Score of one evaluator/evaluated pair.
#[derive(Debug, Clone, PartialEq)]
pub struct PairScore {
    pub evaluated: String,
    pub raw_count: i64,
    pub percentage: f64,
    pub penalty: i64,
    pub adjusted: i64,
    pub threshold: i64,
    pub flagged: bool,
}

/// Applies a [`FlagRule`] to evaluator pair counts.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnomalyScorer {
    rule: FlagRule,
}

impl AnomalyScorer {
    pub fn new(rule: FlagRule) -> Self {
        Self { rule }
    }

    /// Threshold for an evaluator of the given level under this rule.
    pub fn threshold(&self, level: f64) -> i64 {
        match self.rule {
            FlagRule::LevelScaled => level_threshold(level),
            FlagRule::Fixed { threshold } => threshold,
        }
    }

    /// Score every eligible pair of one evaluator.
    ///
    /// Pairs with a count of 1 or less are never evidence of a pattern and
    /// are left out, as is everything when the evaluator has no activity.
    /// The result keeps the counter's login order.
    pub fn score(&self, level: f64, counts: &BTreeMap<String, i64>) -> Vec<PairScore> {
        let threshold = self.threshold(level);
        let total = total_activity(counts);
        if total == 0 {
            return Vec::new();
        }

        let min_count = match self.rule {
            FlagRule::LevelScaled => 2,
            FlagRule::Fixed { threshold } => threshold.max(2),
        };

        counts
            .iter()
            .filter(|(_, &count)| count >= min_count)
            .map(|(evaluated, &count)| {
                let percentage = count as f64 / total as f64;
                let penalty = concentration_penalty(total, percentage);
                let adjusted = count + penalty;
                let flagged = match self.rule {
                    FlagRule::LevelScaled => adjusted > threshold,
                    FlagRule::Fixed { .. } => adjusted >= threshold,
                };

                PairScore {
                    evaluated: evaluated.clone(),
                    raw_count: count,
                    percentage,
                    penalty,
                    adjusted,
                    threshold,
                    flagged,
                }
            })
            .collect()
    }

    /// Only the flagged pairs of one evaluator.
    pub fn flagged(&self, level: f64, counts: &BTreeMap<String, i64>) -> Vec<PairScore> {
        self.score(level, counts)
            .into_iter()
            .filter(|pair| pair.flagged)
            .collect()
    }
}
