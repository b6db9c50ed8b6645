//! Output formatting for reports

use crate::commands::banner;
use crate::OutputFormat;
use anyhow::Result;
use apk_triage_core::report::{risk_for_category, Report};
use apk_triage_core::Severity;
use colored::Colorize;

/// Format a report according to the specified format
pub fn format_report(report: &Report, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(format_text(report)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
    }
}

fn format_text(report: &Report) -> String {
    let mut output = String::new();

    let subject = report
        .subject
        .package_name
        .as_deref()
        .unwrap_or(&report.subject.package_file);
    output.push_str(&format!("\n{} {}", "Scan Results:".bold(), subject));
    if let Some(ref version) = report.subject.version {
        output.push_str(&format!(" v{}", version));
    }
    output.push('\n');
    output.push_str(&format!("{}\n\n", "=".repeat(60)));

    if report.categories.is_empty() {
        output.push_str(&format!("{}\n", "No security issues found.".green()));
    }

    for (name, category) in &report.categories {
        output.push_str(&format!(
            "{} {} ({})\n",
            banner::severity_badge(&risk_for_category(name)),
            name.bold(),
            category.count
        ));
        for finding in &category.findings {
            for (i, line) in finding.lines().enumerate() {
                if i == 0 {
                    output.push_str(&format!("  - {}\n", line));
                } else {
                    output.push_str(&format!("    {}\n", line.dimmed()));
                }
            }
        }
        output.push('\n');
    }

    if !report.notes.is_empty() {
        output.push_str(&format!("{}\n", "Notes:".dimmed()));
        for (category, notes) in &report.notes {
            for note in notes {
                output.push_str(&format!("  {} {}\n", format!("{}:", category).dimmed(), note));
            }
        }
        output.push('\n');
    }

    output
}

/// Print the one-screen summary after a scan
pub fn print_summary(report: &Report) {
    let summary = &report.summary;

    println!("{}", "=".repeat(60));
    println!("Package file: {}", report.subject.package_file.bold());
    println!(
        "Files scanned: {}  Patterns: {}  Cache: {}",
        summary.total_files_scanned,
        summary.total_patterns,
        if summary.cache_hit { "hit" } else { "miss" }
    );

    if summary.vulnerability_count == 0 {
        println!("{}", "No security issues found.".green().bold());
    } else {
        println!(
            "Found {} issue(s): {} high, {} medium, {} low risk",
            summary.vulnerability_count.to_string().bold(),
            summary.risk_breakdown.high.to_string().red().bold(),
            summary.risk_breakdown.medium.to_string().yellow(),
            summary.risk_breakdown.low
        );
        for severity in [Severity::Critical, Severity::High, Severity::Medium, Severity::Low] {
            if let Some(count) = summary.severity_breakdown.get(&severity) {
                println!("  {} {}", banner::severity_badge(&severity), count);
            }
        }
    }

    if summary.partial_decompile {
        println!(
            "{} decompiler reported errors; results cover a partial tree",
            banner::status_warn()
        );
    }
    for failure in &summary.failed_analyzers {
        println!(
            "{} analyzer {} failed: {}",
            banner::status_fail(),
            failure.category,
            failure.error.dimmed()
        );
    }
    println!("{}", "=".repeat(60));
}
