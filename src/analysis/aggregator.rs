//! Per-pair evaluation tallies.
//!
//! This module provides the counter table the detector accumulates into and
//! the delta rule that turns a final mark into a signed contribution.

use std::collections::BTreeMap;

/// Signed contribution of a final mark: `+1` at or above the pass mark,
/// `-1` below it.
pub fn mark_delta(final_mark: i64, pass_mark: i64) -> i64 {
    if final_mark >= pass_mark {
        1
    } else {
        -1
    }
}

/// Evaluator → (evaluated → signed score).
///
/// Backed by ordered maps so iteration, and everything derived from it, is
/// stable from run to run. Scores are unbounded and only move through
/// [`PairCounter::add`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PairCounter {
    pairs: BTreeMap<String, BTreeMap<String, i64>>,
}

impl PairCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `delta` to the pair's running score.
    pub fn add(&mut self, evaluator: &str, evaluated: &str, delta: i64) {
        *self
            .pairs
            .entry(evaluator.to_string())
            .or_default()
            .entry(evaluated.to_string())
            .or_default() += delta;
    }

    /// Current score of a pair, `None` if the pair was never counted.
    #[cfg(test)]
    pub fn get(&self, evaluator: &str, evaluated: &str) -> Option<i64> {
        self.pairs.get(evaluator)?.get(evaluated).copied()
    }

    /// All counts of one evaluator.
    pub fn counts_for(&self, evaluator: &str) -> Option<&BTreeMap<String, i64>> {
        self.pairs.get(evaluator)
    }

    /// Iterate evaluators and their counts in login order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeMap<String, i64>)> {
        self.pairs.iter()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Total activity of an evaluator: the sum of absolute pair scores.
pub fn total_activity(counts: &BTreeMap<String, i64>) -> i64 {
    counts.values().map(|v| v.abs()).sum()
}
