//! Audit report rendering.
//!
//! Turns a consolidated report plus run metadata into the Markdown or
//! JSON document written to disk.

use crate::config::ReportConfig;
use crate::models::{ConsolidatedReport, ReportMetadata, Severity, TaggedFinding};
use anyhow::Result;
use serde_json::json;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(
    metadata: &ReportMetadata,
    report: &ConsolidatedReport,
    config: &ReportConfig,
) -> String {
    let mut output = String::new();

    output.push_str("# SwarmAudit Report\n\n");
    output.push_str(&generate_metadata_section(metadata));
    output.push_str(&generate_summary_section(report));
    output.push_str(&generate_findings_section(report, config));
    output.push_str(&generate_footer());

    output
}

/// Generate a JSON report wrapping metadata and the consolidated view.
pub fn generate_json_report(
    metadata: &ReportMetadata,
    report: &ConsolidatedReport,
) -> Result<String> {
    let document = json!({
        "metadata": metadata,
        "report": report,
    });
    Ok(serde_json::to_string_pretty(&document)?)
}

fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Input:** `{}`\n", metadata.input_path));
    section.push_str(&format!(
        "- **Analysis Date:** {}\n",
        metadata.analysis_date.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Model Used:** `{}`\n", metadata.model_used));
    section.push_str(&format!("- **Plan:** `{}`\n", metadata.plan_id));
    section.push_str(&format!(
        "- **Analysis Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

fn generate_summary_section(report: &ConsolidatedReport) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");
    section.push_str(&format!("- **Total Findings:** {}\n", report.total_findings));
    section.push_str(&format!("- **Risk Score:** {}\n", report.risk_score));
    section.push('\n');

    if !report.severity_breakdown.is_empty() {
        section.push_str("### By Severity\n\n");
        for severity in [
            Severity::Critical,
            Severity::High,
            Severity::Medium,
            Severity::Low,
        ] {
            if let Some(count) = report.severity_breakdown.get(&severity) {
                section.push_str(&format!(
                    "- {} **{}:** {}\n",
                    severity.emoji(),
                    severity,
                    count
                ));
            }
        }
        section.push('\n');
    }

    if !report.worker_breakdown.is_empty() {
        section.push_str("### By Worker\n\n");
        for (worker, count) in &report.worker_breakdown {
            section.push_str(&format!("- **{worker}:** {count}\n"));
        }
        section.push('\n');
    }

    section
}

fn generate_findings_section(report: &ConsolidatedReport, config: &ReportConfig) -> String {
    let mut section = String::new();

    section.push_str("## Findings\n\n");

    if report.findings.is_empty() {
        section.push_str("No findings. 🎉\n\n");
        return section;
    }

    for (index, tagged) in report.findings.iter().enumerate() {
        section.push_str(&generate_finding_entry(index + 1, tagged, config));
    }

    section
}

fn generate_finding_entry(number: usize, tagged: &TaggedFinding, config: &ReportConfig) -> String {
    let finding = &tagged.finding;
    let mut entry = String::new();

    let title = if finding.title.is_empty() {
        &finding.category
    } else {
        &finding.title
    };
    entry.push_str(&format!(
        "### {}. {} {}\n\n",
        number,
        finding.severity.emoji(),
        title
    ));
    entry.push_str(&format!(
        "- **Severity:** {} | **Category:** {} | **Worker:** {}\n",
        finding.severity, finding.category, tagged.worker_type
    ));
    if let Some(line) = finding.line {
        entry.push_str(&format!("- **Line:** {line}\n"));
    }
    entry.push_str(&format!("\n{}\n\n", finding.description));

    if config.include_suggestions {
        if let Some(ref suggestion) = finding.suggestion {
            entry.push_str(&format!("**Suggestion:** {suggestion}\n\n"));
        }
    }

    entry
}

fn generate_footer() -> String {
    format!(
        "---\n\n*Generated by SwarmAudit v{}*\n",
        env!("CARGO_PKG_VERSION")
    )
}
