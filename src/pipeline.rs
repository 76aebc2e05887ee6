//! Run orchestration.
//!
//! Walks the login list, pulls each evaluator's records from a
//! [`RecordSource`] and folds them into a [`Detector`]. Runs synchronously;
//! the binary puts it on a blocking thread.

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::analysis::{Detector, LevelResolver, ReceivedDetector};
use crate::models::{Alert, EvaluationRecord, IngestStats};
use crate::source::{unique_logins, RecordSource};

/// Options for [`run`].
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Keep every fetched record in the outcome, for export.
    pub keep_records: bool,
    pub show_progress: bool,
}

/// Result of a full run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub alerts: Vec<Alert>,
    pub stats: IngestStats,
    pub logins_processed: usize,
    /// Fetched records, only filled with [`RunOptions::keep_records`].
    pub records: Vec<EvaluationRecord>,
}

/// Process every login once, then score all evaluators.
///
/// Repeated logins are processed once. A login whose own level cannot be
/// resolved is skipped without fetching its evaluations and does not count
/// as processed.
pub fn run<S, R>(
    logins: &[String],
    source: &mut S,
    detector: &mut Detector<R>,
    options: &RunOptions,
) -> RunOutcome
where
    S: RecordSource,
    R: LevelResolver,
{
    let logins = unique_logins(logins.iter().cloned());
    let progress = progress_bar(logins.len() as u64, options.show_progress);
    let mut records_kept = Vec::new();
    let mut processed = 0;

    for login in &logins {
        progress.set_message(login.clone());

        match detector.levels_mut().resolve(login) {
            Some(level) => info!("Processing '{}' (level {:.2})", login, level),
            None => {
                warn!("Level not found for '{}', skipping", login);
                progress.inc(1);
                continue;
            }
        }

        let records = source.given_by(login);
        let counted = detector.ingest_all(&records);
        processed += 1;
        info!(
            "'{}': {} evaluations fetched, {} counted",
            login,
            records.len(),
            counted
        );

        if options.keep_records {
            records_kept.extend(records);
        }
        progress.inc(1);
    }

    progress.finish_and_clear();

    RunOutcome {
        alerts: detector.alerts(),
        stats: detector.stats().clone(),
        logins_processed: processed,
        records: records_kept,
    }
}

/// Score the evaluations `detector`'s login received, per evaluator.
pub fn run_received<S, R>(
    source: &mut S,
    detector: &mut ReceivedDetector<R>,
    options: &RunOptions,
) -> RunOutcome
where
    S: RecordSource,
    R: LevelResolver,
{
    let login = detector.login().to_string();

    let Some(level) = detector.levels_mut().resolve(&login) else {
        warn!("Level not found for '{}', nothing fetched", login);
        return RunOutcome {
            alerts: Vec::new(),
            stats: detector.stats().clone(),
            logins_processed: 0,
            records: Vec::new(),
        };
    };
    info!("Processing evaluations received by '{}' (level {:.2})", login, level);

    let records = source.received_by(&login);
    let counted = detector.ingest_all(&records);
    info!(
        "'{}': {} evaluations received, {} counted",
        login,
        records.len(),
        counted
    );

    RunOutcome {
        alerts: detector.alerts(),
        stats: detector.stats().clone(),
        logins_processed: 1,
        records: if options.keep_records { records } else { Vec::new() },
    }
}

fn progress_bar(len: u64, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{RecordFilter, ScoringPolicy, StaticLevels};
    use crate::source::CsvRecords;

    fn record(evaluator: &str, evaluated: &str, project: &str) -> EvaluationRecord {
        EvaluationRecord {
            evaluator: evaluator.to_string(),
            evaluated: evaluated.to_string(),
            final_mark: Some(100),
            project: project.to_string(),
            cursus_id: Some(21),
            created_at: None,
        }
    }

    fn fixture() -> (CsvRecords, StaticLevels) {
        let mut records: Vec<_> = (0..5).map(|_| record("alice", "bob", "libft")).collect();
        records.push(record("alice", "alice", "libft"));
        records.push(record("alice", "bob", "rush-00"));
        records.extend((0..4).map(|_| record("mallory", "bob", "libft")));

        let levels = [("alice", 3.0), ("bob", 1.0)]
            .iter()
            .map(|(login, level)| (login.to_string(), *level))
            .collect();

        (CsvRecords::from_records("fixture", records), levels)
    }

    fn logins(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_run_end_to_end() {
        let (mut source, levels) = fixture();
        let mut detector = Detector::new(ScoringPolicy::default(), RecordFilter::default(), levels);
        let options = RunOptions {
            keep_records: true,
            show_progress: false,
        };

        let outcome = run(
            &logins(&["alice", "mallory"]),
            &mut source,
            &mut detector,
            &options,
        );

        assert_eq!(outcome.alerts.len(), 1);
        let alert = &outcome.alerts[0];
        assert_eq!((alert.evaluator.as_str(), alert.evaluated.as_str()), ("alice", "bob"));
        assert_eq!(alert.raw_count, 5);
        assert_eq!(alert.adjusted_score, 5);
        assert_eq!(alert.percent_label(), "100%");

        // mallory has no level, so nothing of theirs was fetched.
        assert_eq!(outcome.logins_processed, 1);
        assert_eq!(outcome.records.len(), 7);
        assert_eq!(outcome.stats.seen, 7);
        assert_eq!(outcome.stats.counted, 5);
        assert_eq!(outcome.stats.self_evaluations, 1);
        assert_eq!(outcome.stats.excluded_projects, 1);
    }

    #[test]
    fn test_run_is_reproducible() {
        let run_once = || {
            let (mut source, levels) = fixture();
            let mut detector =
                Detector::new(ScoringPolicy::default(), RecordFilter::default(), levels);
            run(
                &logins(&["alice", "mallory"]),
                &mut source,
                &mut detector,
                &RunOptions::default(),
            )
        };

        let first = run_once();
        let second = run_once();
        assert_eq!(first.alerts, second.alerts);
        assert!(first.records.is_empty());
    }

    #[test]
    fn test_repeated_login_is_counted_once() {
        let records = vec![
            record("carol", "dave", "ft_printf"),
            record("carol", "dave", "ft_printf"),
        ];
        let levels: StaticLevels = [("carol".to_string(), 2.0), ("dave".to_string(), 1.0)]
            .into_iter()
            .collect();
        let mut source = CsvRecords::from_records("fixture", records);
        let mut detector = Detector::new(ScoringPolicy::default(), RecordFilter::default(), levels);

        let outcome = run(
            &logins(&["carol", "carol"]),
            &mut source,
            &mut detector,
            &RunOptions::default(),
        );

        assert_eq!(detector.counter().get("carol", "dave"), Some(2));
        assert_eq!(outcome.stats.seen, 2);
        assert_eq!(outcome.logins_processed, 1);
        assert!(outcome.alerts.is_empty());
    }

    #[test]
    fn test_run_received() {
        let (mut source, levels) = fixture();
        let mut detector =
            ReceivedDetector::new("bob", ScoringPolicy::default(), RecordFilter::default(), levels);
        let options = RunOptions {
            keep_records: true,
            show_progress: false,
        };

        let outcome = run_received(&mut source, &mut detector, &options);

        // bob (level 1.0, threshold 3) got 5 libft validations from alice and
        // 4 from mallory; the rush record is excluded.
        assert_eq!(outcome.logins_processed, 1);
        assert_eq!(outcome.records.len(), 10);
        assert_eq!(outcome.stats.counted, 9);
        let flagged: Vec<(&str, i64)> = outcome
            .alerts
            .iter()
            .map(|a| (a.evaluator.as_str(), a.raw_count))
            .collect();
        assert_eq!(flagged, vec![("alice", 5), ("mallory", 4)]);
        assert_eq!(outcome.alerts[1].evaluator_level, None);
    }

    #[test]
    fn test_run_received_without_level() {
        let (mut source, levels) = fixture();
        let mut detector = ReceivedDetector::new(
            "mallory",
            ScoringPolicy::default(),
            RecordFilter::default(),
            levels,
        );

        let outcome = run_received(&mut source, &mut detector, &RunOptions::default());
        assert_eq!(outcome.logins_processed, 0);
        assert!(outcome.alerts.is_empty());
    }
}
