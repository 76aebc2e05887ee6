//! Record eligibility.
//!
//! Decides which evaluation records may contribute to the pair counter.

use crate::models::{EvaluationRecord, SkipReason};

/// Project keywords excluded from aggregation by default.
///
/// Pools, rushes, exams and the shell/C piscine modules are gated by other
/// mechanisms and would only add noise.
pub const DEFAULT_EXCLUDED_KEYWORDS: [&str; 5] = ["piscine", "rush", "exam", "shell-", "c-"];

/// Outcome of [`RecordFilter::admit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    SelfEvaluation,
    /// The project name contains this excluded keyword.
    ExcludedProject(String),
    UnresolvedLevel,
}

impl Admission {
    /// The skip reason for a rejection, `None` when admitted.
    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Admission::Admitted => None,
            Admission::SelfEvaluation => Some(SkipReason::SelfEvaluation),
            Admission::ExcludedProject(_) => Some(SkipReason::ExcludedProject),
            Admission::UnresolvedLevel => Some(SkipReason::UnresolvedLevel),
        }
    }
}

/// Pure eligibility predicate over evaluation records.
#[derive(Debug, Clone)]
pub struct RecordFilter {
    excluded_keywords: Vec<String>,
}

impl Default for RecordFilter {
    fn default() -> Self {
        Self::new(DEFAULT_EXCLUDED_KEYWORDS.iter().map(|k| k.to_string()))
    }
}

impl RecordFilter {
    pub fn new(excluded_keywords: impl IntoIterator<Item = String>) -> Self {
        Self {
            excluded_keywords: excluded_keywords
                .into_iter()
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// Checks that need no level information.
    ///
    /// Run this first so no level lookup is spent on records that would be
    /// rejected anyway.
    pub fn precheck(&self, record: &EvaluationRecord) -> Admission {
        if record.is_self_evaluation() {
            return Admission::SelfEvaluation;
        }

        // Case-sensitive substring match, "C Piscine" is not caught by "piscine".
        if let Some(keyword) = self
            .excluded_keywords
            .iter()
            .find(|k| record.project.contains(k.as_str()))
        {
            return Admission::ExcludedProject(keyword.clone());
        }

        Admission::Admitted
    }

    /// Full eligibility decision given the evaluated peer's level.
    pub fn admit(&self, record: &EvaluationRecord, evaluated_level: Option<f64>) -> Admission {
        match self.precheck(record) {
            Admission::Admitted if evaluated_level.is_none() => Admission::UnresolvedLevel,
            admission => admission,
        }
    }

    pub fn excluded_keywords(&self) -> &[String] {
        &self.excluded_keywords
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn test_admits_regular_record() {
        let filter = RecordFilter::default();
        assert_eq!(
            filter.admit(&record("alice", "bob", "libft"), Some(2.0)),
            Admission::Admitted
        );
    }

    #[test]
    fn test_rejects_self_evaluation() {
        let filter = RecordFilter::default();
        let admission = filter.admit(&record("alice", "alice", "libft"), Some(2.0));
        assert_eq!(admission, Admission::SelfEvaluation);
        assert_eq!(admission.skip_reason(), Some(SkipReason::SelfEvaluation));
    }

    #[test]
    fn test_rejects_excluded_keywords() {
        let filter = RecordFilter::default();
        for (project, keyword) in [
            ("c-piscine-c-00", "piscine"),
            ("rush-01", "rush"),
            ("exam-rank-02", "exam"),
            ("shell-00", "shell-"),
            ("c-05", "c-"),
        ] {
            assert_eq!(
                filter.admit(&record("alice", "bob", project), Some(2.0)),
                Admission::ExcludedProject(keyword.to_string()),
                "project {project}"
            );
        }
    }

    #[test]
    fn test_keyword_match_is_case_sensitive() {
        let filter = RecordFilter::default();
        assert_eq!(
            filter.admit(&record("alice", "bob", "C Piscine Shell 00"), Some(2.0)),
            Admission::Admitted
        );
        assert_eq!(
            filter.admit(&record("alice", "bob", "Exam Rank 03"), Some(2.0)),
            Admission::Admitted
        );
    }

    #[test]
    fn test_rejects_unresolved_level() {
        let filter = RecordFilter::default();
        assert_eq!(
            filter.admit(&record("alice", "bob", "libft"), None),
            Admission::UnresolvedLevel
        );
        // Earlier rejections win over the level check.
        assert_eq!(
            filter.admit(&record("alice", "alice", "libft"), None),
            Admission::SelfEvaluation
        );
    }

    #[test]
    fn test_custom_keywords() {
        let filter = RecordFilter::new(vec!["ft_".to_string(), String::new()]);
        assert_eq!(filter.excluded_keywords(), &["ft_".to_string()]);
        assert_eq!(
            filter.admit(&record("alice", "bob", "ft_printf"), Some(1.0)),
            Admission::ExcludedProject("ft_".to_string())
        );
        assert_eq!(
            filter.admit(&record("alice", "bob", "rush-00"), Some(1.0)),
            Admission::Admitted
        );
    }
}
