//! Configuration file handling.
//!
//! This module handles loading `.evalwatch.toml` files and merging them
//! with command-line arguments.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::analysis::{FlagRule, RecordFilter, ScoringPolicy, DEFAULT_EXCLUDED_KEYWORDS};
use crate::cli::{Args, FlagRuleKind, OutputFormat};
use crate::intra::ClientConfig;

/// Default configuration file name.
pub const CONFIG_FILE: &str = ".evalwatch.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Intranet API settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Scoring policy.
    #[serde(default)]
    pub policy: PolicyConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Login list processed when --users is not given.
    #[serde(default = "default_users")]
    pub users: PathBuf,

    /// Report output path. Defaults to `results/alerts.<format extension>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,

    /// Report format.
    #[serde(default)]
    pub format: OutputFormat,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            users: default_users(),
            output: None,
            format: OutputFormat::default(),
            verbose: false,
        }
    }
}

fn default_users() -> PathBuf {
    PathBuf::from("users/users.txt")
}

/// Intranet API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API root URL.
    #[serde(default = "default_api_url")]
    pub url: String,

    /// Cursus whose level is used.
    #[serde(default = "default_cursus_id")]
    pub cursus_id: i64,

    /// Items per page when paginating.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: default_api_url(),
            cursus_id: default_cursus_id(),
            page_size: default_page_size(),
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.intra.42.fr".to_string()
}

fn default_cursus_id() -> i64 {
    21 // 42cursus
}

/// Largest page the intranet API serves.
const MAX_PAGE_SIZE: usize = 100;

fn default_page_size() -> usize {
    MAX_PAGE_SIZE
}

fn default_timeout() -> u64 {
    15
}

/// Scoring policy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Minimum final mark counted as a validation.
    #[serde(default = "default_pass_mark")]
    pub pass_mark: i64,

    /// How thresholds are derived.
    #[serde(default)]
    pub flag_rule: FlagRuleKind,

    /// Threshold of the fixed flag rule.
    #[serde(default = "default_fixed_threshold")]
    pub fixed_threshold: i64,

    /// Project name substrings excluded from aggregation (case-sensitive).
    #[serde(default = "default_excluded_keywords")]
    pub excluded_keywords: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            pass_mark: default_pass_mark(),
            flag_rule: FlagRuleKind::default(),
            fixed_threshold: default_fixed_threshold(),
            excluded_keywords: default_excluded_keywords(),
        }
    }
}

fn default_pass_mark() -> i64 {
    crate::analysis::scorer::DEFAULT_PASS_MARK
}

fn default_fixed_threshold() -> i64 {
    crate::analysis::scorer::DEFAULT_FIXED_THRESHOLD
}

fn default_excluded_keywords() -> Vec<String> {
    DEFAULT_EXCLUDED_KEYWORDS
        .iter()
        .map(|k| k.to_string())
        .collect()
}

impl From<&PolicyConfig> for ScoringPolicy {
    fn from(config: &PolicyConfig) -> Self {
        let flag_rule = match config.flag_rule {
            FlagRuleKind::LevelScaled => FlagRule::LevelScaled,
            FlagRuleKind::Fixed => FlagRule::Fixed {
                threshold: config.fixed_threshold,
            },
        };

        Self {
            pass_mark: config.pass_mark,
            flag_rule,
        }
    }
}

impl From<&PolicyConfig> for RecordFilter {
    fn from(config: &PolicyConfig) -> Self {
        RecordFilter::new(config.excluded_keywords.iter().cloned())
    }
}

impl From<&ApiConfig> for ClientConfig {
    fn from(config: &ApiConfig) -> Self {
        Self {
            api_url: config.url.trim_end_matches('/').to_string(),
            cursus_id: config.cursus_id,
            page_size: config.page_size,
            timeout_seconds: config.timeout_seconds,
        }
    }
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were actually given.
    pub fn merge_with_args(&mut self, args: &Args) {
        if let Some(ref users) = args.users {
            self.general.users = users.clone();
        }
        if let Some(ref output) = args.output {
            self.general.output = Some(output.clone());
        }
        if let Some(format) = args.format {
            self.general.format = format;
        }
        if args.verbose {
            self.general.verbose = true;
        }

        if let Some(ref url) = args.api_url {
            self.api.url = url.clone();
        }
        if let Some(cursus_id) = args.cursus_id {
            self.api.cursus_id = cursus_id;
        }
        if let Some(timeout) = args.timeout {
            self.api.timeout_seconds = timeout;
        }

        if let Some(pass_mark) = args.pass_mark {
            self.policy.pass_mark = pass_mark;
        }
        if let Some(flag_rule) = args.flag_rule {
            self.policy.flag_rule = flag_rule;
        }
        if let Some(threshold) = args.fixed_threshold {
            self.policy.fixed_threshold = threshold;
        }
    }

    /// Validate the merged settings.
    ///
    /// The CLI flags are checked by [`Args::validate`]; this catches the same
    /// mistakes coming from the config file.
    pub fn validate(&self) -> Result<(), String> {
        if !self.api.url.starts_with("http://") && !self.api.url.starts_with("https://") {
            return Err("[api] url must start with 'http://' or 'https://'".to_string());
        }

        if !(1..=MAX_PAGE_SIZE).contains(&self.api.page_size) {
            return Err(format!(
                "[api] page_size must be between 1 and {}",
                MAX_PAGE_SIZE
            ));
        }

        if self.api.timeout_seconds == 0 {
            return Err("[api] timeout_seconds must be at least 1".to_string());
        }

        if self.policy.pass_mark < 0 {
            return Err("[policy] pass_mark cannot be negative".to_string());
        }

        if self.policy.fixed_threshold < 1 {
            return Err("[policy] fixed_threshold must be at least 1".to_string());
        }

        Ok(())
    }

    /// Where the report goes: the configured path or
    /// `results/alerts.<extension>`.
    pub fn output_path(&self) -> PathBuf {
        self.general.output.clone().unwrap_or_else(|| {
            PathBuf::from("results").join(format!("alerts.{}", self.general.format.extension()))
        })
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
