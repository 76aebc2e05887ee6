//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation. Values left unset fall back to the
//! configuration file, then to built-in defaults.

use chrono::NaiveDate;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// evalwatch - peer evaluation anomaly detector for the 42 intranet
///
/// Fetches the evaluations each listed login gave, tallies validations per
/// evaluated peer and flags pairs whose count is out of line with the
/// evaluator's level.
///
/// Examples:
///   evalwatch --users users/users.txt
///   evalwatch --users users/users.txt --export-records results/records.csv
///   evalwatch --records results/records.csv --levels levels.csv --format markdown
///   evalwatch --received alice
///   evalwatch --fetch-campus 37 --users users/users.txt
///   evalwatch --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// File with the evaluator logins to process, one per line
    ///
    /// Defaults to users/users.txt. With --records, every evaluator in the
    /// records file is processed when no login list is given.
    #[arg(short, long, value_name = "FILE")]
    pub users: Option<PathBuf>,

    /// Read evaluation records from a CSV file instead of the API
    #[arg(long, value_name = "FILE", requires = "levels")]
    pub records: Option<PathBuf>,

    /// Level table (login,level CSV) used with --records
    #[arg(long, value_name = "FILE", requires = "records")]
    pub levels: Option<PathBuf>,

    /// Score the evaluations this login received instead of the ones a
    /// login list gave
    ///
    /// The threshold comes from this login's level and every evaluator of it
    /// is checked.
    #[arg(long, value_name = "LOGIN", conflicts_with = "users")]
    pub received: Option<String>,

    /// Write the active users of this campus to the login list and exit
    ///
    /// The list goes to --users (default users/users.txt).
    #[arg(
        long,
        value_name = "CAMPUS_ID",
        conflicts_with_all = ["records", "received", "export_records"]
    )]
    pub fetch_campus: Option<u64>,

    /// With --fetch-campus, keep users created after this date (YYYY-MM-DD)
    #[arg(long, value_name = "DATE", default_value = "2022-01-08")]
    pub created_after: NaiveDate,

    /// Output file path for the alert report
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (csv, markdown, json)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Minimum final mark counted as a validation
    #[arg(long, value_name = "MARK")]
    pub pass_mark: Option<i64>,

    /// How evaluator thresholds are derived (level-scaled, fixed)
    #[arg(long, value_name = "RULE")]
    pub flag_rule: Option<FlagRuleKind>,

    /// Threshold used by the fixed flag rule
    #[arg(long, value_name = "COUNT")]
    pub fixed_threshold: Option<i64>,

    /// Cursus whose level is used
    #[arg(long, value_name = "ID")]
    pub cursus_id: Option<i64>,

    /// Write every fetched evaluation record to this CSV file
    #[arg(long, value_name = "FILE")]
    pub export_records: Option<PathBuf>,

    /// API client id
    #[arg(long, env = "UID", hide_env_values = true)]
    pub uid: Option<String>,

    /// API client secret
    #[arg(long, env = "SECRET", hide_env_values = true)]
    pub secret: Option<String>,

    /// Intranet API root URL
    #[arg(long, value_name = "URL")]
    pub api_url: Option<String>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .evalwatch.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Exit with code 2 when any alert is raised
    ///
    /// Useful for scheduled runs that should page someone.
    #[arg(long)]
    pub fail_on_alerts: bool,

    /// List the logins that would be processed and exit without requests
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default .evalwatch.toml configuration file
    #[arg(long)]
    pub init_config: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,
}

/// Output format for the report.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// CSV sheet (default)
    #[default]
    Csv,
    /// Markdown format
    Markdown,
    /// JSON format
    Json,
}

impl OutputFormat {
    /// File extension matching the format.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Markdown => "md",
            OutputFormat::Json => "json",
        }
    }
}

/// Flag rule selector for --flag-rule and the config file.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum FlagRuleKind {
    /// Threshold derived from the evaluator's level
    #[default]
    LevelScaled,
    /// Constant threshold, inclusive comparison
    Fixed,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// True when records come from a CSV file rather than the API.
    pub fn is_offline(&self) -> bool {
        self.records.is_some()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref url) = self.api_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("API URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(mark) = self.pass_mark {
            if mark < 0 {
                return Err("Pass mark cannot be negative".to_string());
            }
        }

        if let Some(threshold) = self.fixed_threshold {
            if threshold < 1 {
                return Err("Fixed threshold must be at least 1".to_string());
            }
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        if let Some(ref login) = self.received {
            if login.trim().is_empty() {
                return Err("--received needs a login".to_string());
            }
        }

        // --fetch-campus writes the login list rather than reading it.
        let users = self.users.as_ref().filter(|_| self.fetch_campus.is_none());

        for (flag, path) in [
            ("--records", self.records.as_ref()),
            ("--levels", self.levels.as_ref()),
            ("--users", users),
        ] {
            if let Some(path) = path {
                if !path.is_file() {
                    return Err(format!("{} file does not exist: {}", flag, path.display()));
                }
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            users: None,
            records: None,
            levels: None,
            received: None,
            fetch_campus: None,
            created_after: NaiveDate::from_ymd_opt(2022, 1, 8).unwrap(),
            output: None,
            format: None,
            pass_mark: None,
            flag_rule: None,
            fixed_threshold: None,
            cursus_id: None,
            export_records: None,
            uid: None,
            secret: None,
            api_url: None,
            timeout: None,
            config: None,
            fail_on_alerts: false,
            dry_run: false,
            init_config: false,
            verbose: false,
            quiet: false,
        }
    }

    #[test]
    fn test_parse_offline_flags() {
        let args = Args::try_parse_from([
            "evalwatch",
            "--records",
            "records.csv",
            "--levels",
            "levels.csv",
            "--format",
            "markdown",
            "--flag-rule",
            "fixed",
            "--pass-mark",
            "50",
        ])
        .unwrap();

        assert!(args.is_offline());
        assert_eq!(args.format, Some(OutputFormat::Markdown));
        assert_eq!(args.flag_rule, Some(FlagRuleKind::Fixed));
        assert_eq!(args.pass_mark, Some(50));
    }

    #[test]
    fn test_records_require_levels() {
        assert!(Args::try_parse_from(["evalwatch", "--records", "records.csv"]).is_err());
        assert!(Args::try_parse_from(["evalwatch", "--levels", "levels.csv"]).is_err());
    }

    #[test]
    fn test_parse_received_and_campus_flags() {
        let args = Args::try_parse_from(["evalwatch", "--received", "alice"]).unwrap();
        assert_eq!(args.received.as_deref(), Some("alice"));
        assert_eq!(args.created_after, NaiveDate::from_ymd_opt(2022, 1, 8).unwrap());

        let args = Args::try_parse_from([
            "evalwatch",
            "--fetch-campus",
            "37",
            "--created-after",
            "2024-03-01",
        ])
        .unwrap();
        assert_eq!(args.fetch_campus, Some(37));
        assert_eq!(args.created_after, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());

        assert!(Args::try_parse_from(["evalwatch", "--received", "alice", "-u", "users.txt"]).is_err());
        assert!(
            Args::try_parse_from(["evalwatch", "--fetch-campus", "37", "--received", "alice"]).is_err()
        );
        assert!(Args::try_parse_from(["evalwatch", "--created-after", "yesterday"]).is_err());
    }

    #[test]
    fn test_fetch_campus_output_need_not_exist() {
        let mut args = make_args();
        args.fetch_campus = Some(37);
        args.users = Some(PathBuf::from("/definitely/not/here/users.txt"));
        assert!(args.validate().is_ok());

        let mut args = make_args();
        args.received = Some("  ".to_string());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_invalid_url() {
        let mut args = make_args();
        args.api_url = Some("api.intra.42.fr".to_string());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_missing_file() {
        let mut args = make_args();
        args.users = Some(PathBuf::from("/definitely/not/here/users.txt"));
        let err = args.validate().unwrap_err();
        assert!(err.contains("--users"));
    }

    #[test]
    fn test_validation_bad_thresholds() {
        let mut args = make_args();
        args.fixed_threshold = Some(0);
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.pass_mark = Some(-1);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }

    #[test]
    fn test_output_format_extension() {
        assert_eq!(OutputFormat::Csv.extension(), "csv");
        assert_eq!(OutputFormat::Markdown.extension(), "md");
        assert_eq!(OutputFormat::Json.extension(), "json");
    }
}
