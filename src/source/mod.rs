//! Record sources and file inputs.
//!
//! Besides the [`RecordSource`] trait, this module reads the inputs a run
//! can start from: the login list, an offline records CSV and a level table.
//! It also writes fetched records back out so a run can be replayed offline.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, warn};

use crate::models::EvaluationRecord;

/// Yields the evaluations given or received by one login.
///
/// Sources never fail: anything that goes wrong upstream is logged and
/// surfaces as an empty list.
pub trait RecordSource {
    fn given_by(&mut self, login: &str) -> Vec<EvaluationRecord>;

    fn received_by(&mut self, login: &str) -> Vec<EvaluationRecord>;

    /// Where the records come from, for reports.
    fn describe(&self) -> String;
}

/// Records loaded from a CSV file written by [`write_records`].
#[derive(Debug, Clone)]
pub struct CsvRecords {
    origin: String,
    records: Vec<EvaluationRecord>,
}

impl CsvRecords {
    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self {
            origin: path.display().to_string(),
            records: read_records(path)?,
        })
    }

    #[cfg(test)]
    pub fn from_records(origin: impl Into<String>, records: Vec<EvaluationRecord>) -> Self {
        Self {
            origin: origin.into(),
            records,
        }
    }

    /// Every evaluator in the file, in order of first appearance.
    pub fn evaluators(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.records
            .iter()
            .filter(|r| seen.insert(r.evaluator.as_str()))
            .map(|r| r.evaluator.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

impl RecordSource for CsvRecords {
    fn given_by(&mut self, login: &str) -> Vec<EvaluationRecord> {
        self.records
            .iter()
            .filter(|r| r.evaluator == login)
            .cloned()
            .collect()
    }

    fn received_by(&mut self, login: &str) -> Vec<EvaluationRecord> {
        self.records
            .iter()
            .filter(|r| r.evaluated == login)
            .cloned()
            .collect()
    }

    fn describe(&self) -> String {
        self.origin.clone()
    }
}

/// Read logins, one per line, skipping blanks and `#` comments.
pub fn read_logins(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read login list: {}", path.display()))?;

    let logins = unique_logins(
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(String::from),
    );

    debug!("Read {} logins from {}", logins.len(), path.display());
    Ok(logins)
}

/// Drop repeated logins, keeping first-seen order.
pub fn unique_logins(logins: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    logins
        .into_iter()
        .filter(|login| {
            let first = seen.insert(login.clone());
            if !first {
                warn!("Login {} listed more than once, processing it once", login);
            }
            first
        })
        .collect()
}

/// Write logins one per line, readable by [`read_logins`].
pub fn write_logins(path: &Path, logins: &[String]) -> Result<()> {
    ensure_parent(path)?;
    let mut content = logins.join("\n");
    content.push('\n');
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write login list: {}", path.display()))
}

/// Read evaluation records from CSV.
pub fn read_records(path: &Path) -> Result<Vec<EvaluationRecord>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open records file: {}", path.display()))?;

    let mut records = Vec::new();
    for (index, result) in reader.deserialize::<EvaluationRecord>().enumerate() {
        let record =
            result.with_context(|| format!("Invalid record on row {} of {}", index + 1, path.display()))?;
        records.push(record);
    }

    debug!("Read {} records from {}", records.len(), path.display());
    Ok(records)
}

/// Write evaluation records as CSV, readable by [`read_records`].
pub fn write_records(path: &Path, records: &[EvaluationRecord]) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create records file: {}", path.display()))?;

    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a `login,level` table. Rows with an empty level are skipped.
pub fn read_levels(path: &Path) -> Result<HashMap<String, f64>> {
    #[derive(Deserialize)]
    struct LevelRow {
        login: String,
        level: Option<f64>,
    }

    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open levels file: {}", path.display()))?;

    let mut levels = HashMap::new();
    for result in reader.deserialize::<LevelRow>() {
        let row = result.with_context(|| format!("Invalid level row in {}", path.display()))?;
        match row.level {
            Some(level) => {
                if levels.insert(row.login.clone(), level).is_some() {
                    warn!("Duplicate level for {} in {}", row.login, path.display());
                }
            }
            None => debug!("No level for {}", row.login),
        }
    }

    Ok(levels)
}

/// Create the parent directory of `path` if needed.
pub fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

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

    #[test]
    fn test_read_logins_skips_blanks_and_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.txt");
        std::fs::write(&path, "alice\n\n  bob  \n# carol\ndave\n").unwrap();

        assert_eq!(read_logins(&path).unwrap(), vec!["alice", "bob", "dave"]);
    }

    #[test]
    fn test_read_logins_drops_repeats() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.txt");
        std::fs::write(&path, "carol\nalice\ncarol\n carol \nalice\n").unwrap();

        assert_eq!(read_logins(&path).unwrap(), vec!["carol", "alice"]);
    }

    #[test]
    fn test_written_logins_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users").join("campus.txt");
        let logins = vec!["alice".to_string(), "bob".to_string()];

        write_logins(&path, &logins).unwrap();
        assert_eq!(read_logins(&path).unwrap(), logins);
    }

    #[test]
    fn test_records_survive_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("records.csv");
        let mut graded = record("alice", "bob", Some(100));
        graded.created_at = Some(Utc.with_ymd_and_hms(2025, 9, 1, 10, 15, 0).unwrap());
        let records = vec![graded, record("alice", "carol", None)];

        write_records(&path, &records).unwrap();
        assert_eq!(read_records(&path).unwrap(), records);
    }

    #[test]
    fn test_read_records_reports_bad_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.csv");
        std::fs::write(
            &path,
            "evaluator,evaluated,final_mark,project,cursus_id,created_at\nalice,bob,lots,libft,21,\n",
        )
        .unwrap();

        let err = read_records(&path).unwrap_err();
        assert!(err.to_string().contains("row 1"));
    }

    #[test]
    fn test_read_levels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("levels.csv");
        std::fs::write(&path, "login,level\nalice,3.0\nbob,\ncarol,1.5\n").unwrap();

        let levels = read_levels(&path).unwrap();
        assert_eq!(levels.len(), 2);
        assert_eq!(levels.get("alice"), Some(&3.0));
        assert_eq!(levels.get("bob"), None);
        assert_eq!(levels.get("carol"), Some(&1.5));
    }

    #[test]
    fn test_csv_records_source() {
        let mut source = CsvRecords::from_records(
            "memory",
            vec![
                record("zoe", "bob", Some(100)),
                record("alice", "bob", Some(100)),
                record("zoe", "carol", Some(0)),
            ],
        );

        assert_eq!(source.evaluators(), vec!["zoe", "alice"]);
        assert_eq!(source.given_by("zoe").len(), 2);
        assert!(source.given_by("nobody").is_empty());
        assert_eq!(source.received_by("bob").len(), 2);
        assert_eq!(source.received_by("carol")[0].evaluator, "zoe");
        assert_eq!(source.describe(), "memory");
    }
}
