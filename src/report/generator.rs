//! Alert report generation.
//!
//! This module renders an [`AlertReport`] as CSV (the spreadsheet the
//! reviewers work from), Markdown or JSON.

use crate::models::{Alert, AlertReport, IngestStats, ReportMetadata};
use anyhow::Result;

/// Column headers of the CSV report.
pub const CSV_HEADERS: [&str; 7] = [
    "Evaluator",
    "Evaluator Level",
    "Evaluated",
    "Evaluated Level",
    "Number of Evaluations",
    "% of Total",
    "Adjusted",
];

/// Generate the CSV alert sheet.
pub fn generate_csv_report(report: &AlertReport) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADERS)?;

    for alert in &report.alerts {
        writer.write_record([
            alert.evaluator.clone(),
            alert.evaluator_level_label(),
            alert.evaluated.clone(),
            alert.evaluated_level_label(),
            alert.raw_count.to_string(),
            alert.percent_label(),
            alert.adjusted_score.to_string(),
        ])?;
    }

    let bytes = writer.into_inner().map_err(|e| anyhow::anyhow!("{}", e))?;
    Ok(String::from_utf8(bytes)?)
}

/// Generate a JSON report.
pub fn generate_json_report(report: &AlertReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &AlertReport) -> String {
    let mut output = String::new();

    output.push_str("# Evaluation Alerts\n\n");
    output.push_str(&generate_metadata_section(&report.metadata, report.alerts.len()));
    output.push_str(&generate_stats_section(&report.stats));
    output.push_str(&generate_alerts_section(&report.alerts));
    output.push_str(&generate_footer());

    output
}

fn generate_metadata_section(metadata: &ReportMetadata, alert_count: usize) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Source:** {}\n", metadata.source));
    section.push_str(&format!(
        "- **Logins Processed:** {}\n",
        metadata.logins_processed
    ));
    section.push_str(&format!("- **Policy:** {}\n", metadata.policy));
    section.push_str(&format!("- **Alerts:** {}\n", alert_count));
    section.push_str(&format!(
        "- **Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

fn generate_stats_section(stats: &IngestStats) -> String {
    let mut section = String::new();

    section.push_str("## Records\n\n");
    section.push_str("| Seen | Counted | Self | Excluded | No Level | No Evaluator Level | No Grade |\n");
    section.push_str("|:---:|:---:|:---:|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} | {} | {} | {} | {} |\n\n",
        stats.seen,
        stats.counted,
        stats.self_evaluations,
        stats.excluded_projects,
        stats.unresolved_levels,
        stats.unresolved_evaluators,
        stats.missing_marks
    ));

    section
}

fn generate_alerts_section(alerts: &[Alert]) -> String {
    let mut section = String::new();

    section.push_str("## Alerts\n\n");

    if alerts.is_empty() {
        section.push_str("No suspicious evaluation patterns were found.\n\n");
        return section;
    }

    section.push_str("| Evaluator | Level | Evaluated | Level | Count | % of Total | Adjusted | Threshold |\n");
    section.push_str("|:---|:---:|:---|:---:|:---:|:---:|:---:|:---:|\n");

    for alert in alerts {
        section.push_str(&format!(
            "| `{}` | {} | `{}` | {} | {} | {} | **{}** | {} |\n",
            alert.evaluator,
            alert.evaluator_level_label(),
            alert.evaluated,
            alert.evaluated_level_label(),
            alert.raw_count,
            alert.percent_label(),
            alert.adjusted_score,
            alert.threshold
        ));
    }
    section.push('\n');

    section
}

fn generate_footer() -> String {
    "---\n\n*Report generated by evalwatch*\n".to_string()
}
