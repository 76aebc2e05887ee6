//! The evaluation anomaly detector.
//!
//! [`Detector`] owns all mutable state of a run: the pair counter, the level
//! cache and the ingest statistics. Records are folded in one at a time with
//! [`Detector::ingest`]; once the stream is exhausted [`Detector::alerts`]
//! scores every evaluator and returns the flagged pairs.

use tracing::{debug, info};

use super::aggregator::{mark_delta, PairCounter};
use super::filter::{Admission, RecordFilter};
use super::levels::{LevelCache, LevelResolver};
use super::scorer::{AnomalyScorer, ScoringPolicy};
use crate::models::{Alert, EvaluationRecord, IngestStats, SkipReason};

/// What [`Detector::ingest`] did with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The pair counter moved by this delta.
    Counted(i64),
    Skipped(SkipReason),
}

pub struct Detector<R> {
    filter: RecordFilter,
    policy: ScoringPolicy,
    scorer: AnomalyScorer,
    levels: LevelCache<R>,
    counter: PairCounter,
    stats: IngestStats,
}

impl<R: LevelResolver> Detector<R> {
    pub fn new(policy: ScoringPolicy, filter: RecordFilter, resolver: R) -> Self {
        Self {
            filter,
            policy,
            scorer: AnomalyScorer::new(policy.flag_rule),
            levels: LevelCache::new(resolver),
            counter: PairCounter::new(),
            stats: IngestStats::default(),
        }
    }

    /// Fold one record into the pair counter.
    pub fn ingest(&mut self, record: &EvaluationRecord) -> IngestOutcome {
        self.stats.seen += 1;
        let outcome = self.classify(record);

        match outcome {
            IngestOutcome::Counted(delta) => {
                self.counter.add(&record.evaluator, &record.evaluated, delta);
                self.stats.counted += 1;
                debug!(
                    "{} -> {} on '{}': mark {:?}, delta {:+}",
                    record.evaluator, record.evaluated, record.project, record.final_mark, delta
                );
            }
            IngestOutcome::Skipped(SkipReason::MissingMark) => {
                self.stats.skip(SkipReason::MissingMark);
                debug!(
                    "No grade for {} (project '{}', cursus {:?})",
                    record.evaluated, record.project, record.cursus_id
                );
            }
            IngestOutcome::Skipped(reason) => {
                self.stats.skip(reason);
                debug!(
                    "Skipped {} -> {} on '{}': {}",
                    record.evaluator, record.evaluated, record.project, reason
                );
            }
        }

        outcome
    }

    /// Fold a whole record stream, returning the number of counted records.
    pub fn ingest_all<'a>(
        &mut self,
        records: impl IntoIterator<Item = &'a EvaluationRecord>,
    ) -> usize {
        records
            .into_iter()
            .filter(|record| matches!(self.ingest(record), IngestOutcome::Counted(_)))
            .count()
    }

    fn classify(&mut self, record: &EvaluationRecord) -> IngestOutcome {
        if self.levels.resolve(&record.evaluator).is_none() {
            return IngestOutcome::Skipped(SkipReason::UnresolvedEvaluator);
        }

        if let Some(reason) = self.filter.precheck(record).skip_reason() {
            return IngestOutcome::Skipped(reason);
        }

        let evaluated_level = self.levels.resolve(&record.evaluated);
        match self.filter.admit(record, evaluated_level) {
            Admission::Admitted => {}
            rejected => {
                return IngestOutcome::Skipped(
                    rejected.skip_reason().unwrap_or(SkipReason::UnresolvedLevel),
                )
            }
        }

        match record.final_mark {
            Some(mark) => IngestOutcome::Counted(mark_delta(mark, self.policy.pass_mark)),
            None => IngestOutcome::Skipped(SkipReason::MissingMark),
        }
    }

    /// Score every evaluator and collect the flagged pairs.
    ///
    /// Evaluators come out in login order and so do their flagged peers.
    /// The evaluated level is looked up only for flagged pairs.
    pub fn alerts(&mut self) -> Vec<Alert> {
        let mut alerts = Vec::new();

        for (evaluator, counts) in self.counter.iter() {
            let Some(evaluator_level) = self.levels.resolve(evaluator) else {
                debug!("Skipping {}: level unresolved", evaluator);
                continue;
            };

            for pair in self.scorer.flagged(evaluator_level, counts) {
                let evaluated_level = self.levels.resolve(&pair.evaluated);
                info!(
                    "ALERT: {} (lvl {:.2}) gave {} valids to {}, adjusted {} (threshold {})",
                    evaluator,
                    evaluator_level,
                    pair.raw_count,
                    pair.evaluated,
                    pair.adjusted,
                    pair.threshold
                );

                alerts.push(Alert {
                    evaluator: evaluator.clone(),
                    evaluator_level: Some(evaluator_level),
                    evaluated: pair.evaluated,
                    evaluated_level,
                    raw_count: pair.raw_count,
                    percentage: pair.percentage,
                    adjusted_score: pair.adjusted,
                    threshold: pair.threshold,
                });
            }
        }

        alerts
    }

    #[cfg(test)]
    pub fn counter(&self) -> &PairCounter {
        &self.counter
    }

    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    #[cfg(test)]
    pub fn levels(&self) -> &LevelCache<R> {
        &self.levels
    }

    pub fn levels_mut(&mut self) -> &mut LevelCache<R> {
        &mut self.levels
    }
}
