//! Reports command implementation

use anyhow::{Context, Result};
use apk_triage_core::report::{delete_report, list_reports};
use colored::Colorize;
use std::path::Path;

use super::banner;

/// List saved reports under `root`
pub fn list(root: &Path) -> Result<()> {
    let reports = list_reports(root)
        .with_context(|| format!("Failed to list reports in {}", root.display()))?;

    banner::print_header("Reports");
    if reports.is_empty() {
        println!("No reports in {}", root.display());
        return Ok(());
    }

    for stored in &reports {
        let status = if stored.has_results {
            banner::status_ok()
        } else {
            banner::status_warn()
        };
        println!(
            "{} {} {} {}",
            status,
            stored.id.bold(),
            format!("[{}]", stored.kind).cyan(),
            stored.modified.format("%Y-%m-%d %H:%M:%S UTC").to_string().dimmed()
        );
        if let Some(ref package) = stored.package {
            println!("    package: {}", package);
        }
        if let Some(ref patched) = stored.patched_package {
            println!("    patched: {}", patched);
        } else if stored.traffic_patch {
            println!("    patched: {}", "requested, not produced".yellow());
        }
    }

    banner::print_divider();
    println!("{} report(s)", reports.len());
    Ok(())
}

/// Delete one saved report
pub fn delete(root: &Path, id: &str) -> Result<()> {
    delete_report(root, id).with_context(|| format!("Failed to delete report {}", id))?;
    println!("{} Deleted report {}", banner::status_ok(), id.bold());
    Ok(())
}
