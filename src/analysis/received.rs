//! Scoring of the evaluations one login received.
//!
//! The mirror image of [`Detector`](super::Detector): counts are kept per
//! evaluator of a single evaluated login, and the threshold comes from the
//! evaluated login's level. Evaluator levels are only looked up for the
//! report and never gate counting.

use tracing::{debug, info, warn};

use super::aggregator::{mark_delta, PairCounter};
use super::detector::IngestOutcome;
use super::filter::RecordFilter;
use super::levels::{LevelCache, LevelResolver};
use super::scorer::{AnomalyScorer, ScoringPolicy};
use crate::models::{Alert, EvaluationRecord, IngestStats, SkipReason};

pub struct ReceivedDetector<R> {
    login: String,
    filter: RecordFilter,
    policy: ScoringPolicy,
    scorer: AnomalyScorer,
    levels: LevelCache<R>,
    counter: PairCounter,
    stats: IngestStats,
}

impl<R: LevelResolver> ReceivedDetector<R> {
    pub fn new(
        login: impl Into<String>,
        policy: ScoringPolicy,
        filter: RecordFilter,
        resolver: R,
    ) -> Self {
        Self {
            login: login.into(),
            filter,
            policy,
            scorer: AnomalyScorer::new(policy.flag_rule),
            levels: LevelCache::new(resolver),
            counter: PairCounter::new(),
            stats: IngestStats::default(),
        }
    }

    pub fn login(&self) -> &str {
        &self.login
    }

    /// Fold one record received by the tracked login.
    pub fn ingest(&mut self, record: &EvaluationRecord) -> IngestOutcome {
        self.stats.seen += 1;
        let outcome = self.classify(record);

        match outcome {
            IngestOutcome::Counted(delta) => {
                self.counter.add(&self.login, &record.evaluator, delta);
                self.stats.counted += 1;
                debug!(
                    "{} <- {} on '{}': mark {:?}, delta {:+}",
                    record.evaluated, record.evaluator, record.project, record.final_mark, delta
                );
            }
            IngestOutcome::Skipped(reason) => {
                self.stats.skip(reason);
                debug!(
                    "Skipped {} <- {} on '{}': {}",
                    record.evaluated, record.evaluator, record.project, reason
                );
            }
        }

        outcome
    }

    /// Fold the records the tracked login received, ignoring any other.
    ///
    /// Returns the number of counted records.
    pub fn ingest_all<'a>(
        &mut self,
        records: impl IntoIterator<Item = &'a EvaluationRecord>,
    ) -> usize {
        let mut counted = 0;
        for record in records {
            if record.evaluated != self.login {
                debug!("Ignoring evaluation of {} by {}", record.evaluated, record.evaluator);
                continue;
            }
            if matches!(self.ingest(record), IngestOutcome::Counted(_)) {
                counted += 1;
            }
        }
        counted
    }

    fn classify(&self, record: &EvaluationRecord) -> IngestOutcome {
        if let Some(reason) = self.filter.precheck(record).skip_reason() {
            return IngestOutcome::Skipped(reason);
        }

        match record.final_mark {
            Some(mark) => IngestOutcome::Counted(mark_delta(mark, self.policy.pass_mark)),
            None => IngestOutcome::Skipped(SkipReason::MissingMark),
        }
    }

    /// Score the tracked login's evaluators and collect the flagged ones.
    ///
    /// Each alert names the suspicious evaluator as `evaluator` and the
    /// tracked login as `evaluated`.
    pub fn alerts(&mut self) -> Vec<Alert> {
        let Some(level) = self.levels.resolve(&self.login) else {
            warn!("Level of {} unresolved, nothing to score", self.login);
            return Vec::new();
        };
        let Some(counts) = self.counter.counts_for(&self.login) else {
            return Vec::new();
        };

        let mut alerts = Vec::new();
        for pair in self.scorer.flagged(level, counts) {
            let evaluator_level = self.levels.resolve(&pair.evaluated);
            info!(
                "ALERT: {} received {} valids from {}, adjusted {} (threshold {})",
                self.login, pair.raw_count, pair.evaluated, pair.adjusted, pair.threshold
            );

            alerts.push(Alert {
                evaluator: pair.evaluated,
                evaluator_level,
                evaluated: self.login.clone(),
                evaluated_level: Some(level),
                raw_count: pair.raw_count,
                percentage: pair.percentage,
                adjusted_score: pair.adjusted,
                threshold: pair.threshold,
            });
        }

        alerts
    }

    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    pub fn levels_mut(&mut self) -> &mut LevelCache<R> {
        &mut self.levels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::levels::StaticLevels;

    fn record(evaluator: &str, evaluated: &str, mark: Option<i64>) -> EvaluationRecord {
        EvaluationRecord {
            evaluator: evaluator.to_string(),
            evaluated: evaluated.to_string(),
            final_mark: mark,
            project: "libft".to_string(),
            cursus_id: Some(21),
            created_at: None,
        }
    }

    fn detector(login: &str, entries: &[(&str, f64)]) -> ReceivedDetector<StaticLevels> {
        let levels = entries
            .iter()
            .map(|(login, level)| (login.to_string(), *level))
            .collect();
        ReceivedDetector::new(login, ScoringPolicy::default(), RecordFilter::default(), levels)
    }

    #[test]
    fn test_threshold_comes_from_the_evaluated_login() {
        // bob is level 1.0 (threshold 3), so 4 validations from alice flag.
        let mut detector = detector("bob", &[("bob", 1.0), ("alice", 9.0)]);
        let records: Vec<_> = (0..4).map(|_| record("alice", "bob", Some(100))).collect();

        assert_eq!(detector.ingest_all(&records), 4);
        let alerts = detector.alerts();

        assert_eq!(
            alerts,
            vec![Alert {
                evaluator: "alice".to_string(),
                evaluator_level: Some(9.0),
                evaluated: "bob".to_string(),
                evaluated_level: Some(1.0),
                raw_count: 4,
                percentage: 1.0,
                adjusted_score: 4,
                threshold: 3,
            }]
        );
    }

    #[test]
    fn test_unknown_evaluator_level_still_counts() {
        let mut detector = detector("bob", &[("bob", 1.0)]);
        let records: Vec<_> = (0..4).map(|_| record("ghost", "bob", Some(100))).collect();
        detector.ingest_all(&records);

        let alerts = detector.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].evaluator_level, None);
        assert_eq!(alerts[0].evaluator_level_label(), "N/A");
    }

    #[test]
    fn test_other_logins_and_self_evaluations_are_ignored() {
        let mut detector = detector("bob", &[("bob", 1.0), ("alice", 3.0)]);
        let records = vec![
            record("alice", "carol", Some(100)),
            record("bob", "bob", Some(100)),
            record("alice", "bob", None),
            record("alice", "bob", Some(100)),
        ];

        assert_eq!(detector.ingest_all(&records), 1);
        let stats = detector.stats();
        assert_eq!(stats.seen, 3);
        assert_eq!(stats.self_evaluations, 1);
        assert_eq!(stats.missing_marks, 1);
        assert!(detector.alerts().is_empty());
    }

    #[test]
    fn test_unresolved_login_raises_nothing() {
        let mut detector = detector("bob", &[("alice", 3.0)]);
        let records: Vec<_> = (0..10).map(|_| record("alice", "bob", Some(100))).collect();
        detector.ingest_all(&records);

        assert_eq!(detector.login(), "bob");
        assert!(detector.alerts().is_empty());
    }
}
