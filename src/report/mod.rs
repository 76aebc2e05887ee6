//! Report generation.
//!
//! Renders alert reports in the format picked on the command line.

pub mod generator;

pub use generator::*;

use anyhow::{Context, Result};
use std::path::Path;

use crate::cli::OutputFormat;
use crate::models::AlertReport;
use crate::source::ensure_parent;

/// Render `report` in `format`.
pub fn render(report: &AlertReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Csv => generate_csv_report(report),
        OutputFormat::Markdown => Ok(generate_markdown_report(report)),
        OutputFormat::Json => generate_json_report(report),
    }
}

/// Render `report` and write it to `path`, creating parent directories.
pub fn write_report(report: &AlertReport, format: OutputFormat, path: &Path) -> Result<()> {
    let content = render(report, format)?;
    ensure_parent(path)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write report to {}", path.display()))
}
