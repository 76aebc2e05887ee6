//! Data models for the evaluation anomaly detector.
//!
//! This module contains the core data structures shared across the
//! pipeline: the evaluation records coming in, the alerts going out,
//! and the report wrapping them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single evaluation given by one login to another.
///
/// One record is produced per corrected user of a fetched scale team, so a
/// group evaluation of three students yields three records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    /// Login that performed the evaluation.
    pub evaluator: String,
    /// Login that received the evaluation.
    pub evaluated: String,
    /// Final mark, absent when the evaluation was never graded.
    pub final_mark: Option<i64>,
    /// Project name the evaluation was for.
    pub project: String,
    /// Cursus the evaluation belongs to.
    pub cursus_id: Option<i64>,
    /// Creation timestamp reported by the API.
    pub created_at: Option<DateTime<Utc>>,
}

impl EvaluationRecord {
    /// Returns true when the evaluator evaluated themselves.
    pub fn is_self_evaluation(&self) -> bool {
        self.evaluated == self.evaluator
    }
}

/// A flagged evaluator/evaluated pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Login that gave the evaluations.
    pub evaluator: String,
    /// Level of the evaluator. Always known for given evaluations; may be
    /// unresolved when scoring what one login received.
    pub evaluator_level: Option<f64>,
    /// Login that received the evaluations.
    pub evaluated: String,
    /// Level of the evaluated peer, if it could be resolved.
    pub evaluated_level: Option<f64>,
    /// Signed running count of validations minus failures.
    pub raw_count: i64,
    /// Share of the evaluator's total activity, between 0 and 1.
    pub percentage: f64,
    /// Raw count plus the concentration penalty.
    pub adjusted_score: i64,
    /// Threshold the adjusted score was compared against.
    pub threshold: i64,
}

impl Alert {
    /// Percentage formatted as a whole percent, e.g. `"100%"`.
    pub fn percent_label(&self) -> String {
        format!("{:.0}%", self.percentage * 100.0)
    }

    pub fn evaluator_level_label(&self) -> String {
        level_label(self.evaluator_level)
    }

    /// Evaluated level formatted for reports, `"N/A"` when unresolved.
    pub fn evaluated_level_label(&self) -> String {
        level_label(self.evaluated_level)
    }
}

fn level_label(level: Option<f64>) -> String {
    match level {
        Some(level) => format!("{:.2}", level),
        None => "N/A".to_string(),
    }
}

/// Why a record did not contribute to the pair counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The evaluator evaluated themselves.
    SelfEvaluation,
    /// The project belongs to an excluded category.
    ExcludedProject,
    /// The evaluated peer's level is unknown.
    UnresolvedLevel,
    /// The evaluator's own level is unknown.
    UnresolvedEvaluator,
    /// The evaluation carries no final mark.
    MissingMark,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::SelfEvaluation => write!(f, "Self evaluation"),
            SkipReason::ExcludedProject => write!(f, "Excluded project"),
            SkipReason::UnresolvedLevel => write!(f, "Unresolved level"),
            SkipReason::UnresolvedEvaluator => write!(f, "Unresolved evaluator"),
            SkipReason::MissingMark => write!(f, "No grade"),
        }
    }
}

/// Counters describing what happened to the ingested records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    /// Records handed to the detector.
    pub seen: usize,
    /// Records that changed the pair counter.
    pub counted: usize,
    pub self_evaluations: usize,
    pub excluded_projects: usize,
    pub unresolved_levels: usize,
    pub unresolved_evaluators: usize,
    pub missing_marks: usize,
}

impl IngestStats {
    /// Record a skipped record under its reason.
    pub fn skip(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::SelfEvaluation => self.self_evaluations += 1,
            SkipReason::ExcludedProject => self.excluded_projects += 1,
            SkipReason::UnresolvedLevel => self.unresolved_levels += 1,
            SkipReason::UnresolvedEvaluator => self.unresolved_evaluators += 1,
            SkipReason::MissingMark => self.missing_marks += 1,
        }
    }

    /// Total number of skipped records.
    pub fn skipped(&self) -> usize {
        self.self_evaluations
            + self.excluded_projects
            + self.unresolved_levels
            + self.unresolved_evaluators
            + self.missing_marks
    }
}

/// Metadata about an alert report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Date and time the report was generated.
    pub generated_at: DateTime<Utc>,
    /// Where the records came from (API URL or CSV path).
    pub source: String,
    /// Number of logins whose evaluations were fetched.
    pub logins_processed: usize,
    /// Human readable scoring policy.
    pub policy: String,
    /// Duration of the run in seconds.
    pub duration_seconds: f64,
}

/// The complete alert report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertReport {
    /// Metadata about the run.
    pub metadata: ReportMetadata,
    /// What happened to the ingested records.
    pub stats: IngestStats,
    /// Flagged pairs, in evaluator then evaluated order.
    pub alerts: Vec<Alert>,
}
