//! Scan command implementation

use crate::output;
use crate::OutputFormat;
use anyhow::{Context, Result};
use apk_triage_core::report::Report;
use apk_triage_core::{ScanConfig, Scanner};
use colored::Colorize;
use std::path::{Path, PathBuf};

use super::banner;

/// Run the scan command
pub async fn run(
    config: ScanConfig,
    paths: Vec<PathBuf>,
    output_dir: Option<PathBuf>,
    format: OutputFormat,
    quiet: bool,
    fail_on_findings: bool,
) -> Result<()> {
    if output_dir.is_none() && config.webhook_url.is_some() {
        tracing::warn!("Webhook is only notified when --output is given");
    }

    let scanner = Scanner::new(config).context("Failed to create scanner")?;
    let multiple = paths.len() > 1;
    let mut total_findings = 0;
    let mut failed = 0;

    for path in &paths {
        let report = match scan_one(&scanner, path, output_dir.as_deref(), multiple).await {
            Ok(report) => report,
            Err(e) => {
                eprintln!("{} {}: {:#}", banner::status_fail(), path.display(), e);
                failed += 1;
                continue;
            }
        };
        total_findings += report.total_findings();

        match format {
            OutputFormat::Json => println!("{}", output::format_report(&report, format)?),
            OutputFormat::Text => {
                if !quiet || report.total_findings() > 0 {
                    print!("{}", output::format_report(&report, format)?);
                }
                if !quiet {
                    output::print_summary(&report);
                }
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} package(s) could not be scanned", failed, paths.len());
    }
    if fail_on_findings && total_findings > 0 {
        std::process::exit(1);
    }
    Ok(())
}

async fn scan_one(
    scanner: &Scanner,
    path: &Path,
    output_dir: Option<&Path>,
    multiple: bool,
) -> Result<Report> {
    tracing::info!("Scanning: {}", path.display());

    let Some(output_dir) = output_dir else {
        return scanner
            .scan_package(path)
            .await
            .with_context(|| format!("Scan of {} failed", path.display()));
    };

    // One sub-directory per package when several are scanned together
    let out = if multiple {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "package".to_string());
        output_dir.join(stem)
    } else {
        output_dir.to_path_buf()
    };

    let (report, paths) = scanner
        .scan_and_export(path, &out)
        .await
        .with_context(|| format!("Scan of {} failed", path.display()))?;
    eprintln!(
        "{} Results written to {}",
        banner::status_ok(),
        paths.results.display().to_string().dimmed()
    );
    Ok(report)
}
