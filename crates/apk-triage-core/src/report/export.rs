//! JSON report export and the on-disk report store

use super::Report;
use crate::error::{Result, ScanError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const RESULTS_FILE: &str = "results.json";
pub const REPORT_FILE: &str = "report.json";
pub const META_FILE: &str = "meta.json";

/// Files written by [`write_reports`]
#[derive(Debug, Clone)]
pub struct ExportPaths {
    pub results: PathBuf,
    pub report: PathBuf,
}

/// Write `results.json` (category to findings) and `report.json` (full report)
pub async fn write_reports(report: &Report, out_dir: &Path) -> Result<ExportPaths> {
    tokio::fs::create_dir_all(out_dir).await.map_err(|e| {
        ScanError::Export(format!("failed to create {}: {}", out_dir.display(), e))
    })?;

    let results = out_dir.join(RESULTS_FILE);
    let json = serde_json::to_string_pretty(&report.results_map())
        .map_err(|e| ScanError::Export(format!("failed to serialize results: {}", e)))?;
    write(&results, json).await?;

    let full = out_dir.join(REPORT_FILE);
    let json = serde_json::to_string_pretty(report)
        .map_err(|e| ScanError::Export(format!("failed to serialize report: {}", e)))?;
    write(&full, json).await?;

    info!("Reports written to {}", out_dir.display());
    Ok(ExportPaths {
        results,
        report: full,
    })
}

async fn write(path: &Path, content: String) -> Result<()> {
    tokio::fs::write(path, content)
        .await
        .map_err(|e| ScanError::Export(format!("failed to write {}: {}", path.display(), e)))
}

/// What a stored report was produced from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportMeta {
    pub original_package: String,
    #[serde(default)]
    pub traffic_patch: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patched_package: Option<String>,
}

/// Write `meta.json` into a report directory
pub async fn write_meta(meta: &ReportMeta, out_dir: &Path) -> Result<PathBuf> {
    let path = out_dir.join(META_FILE);
    let json = serde_json::to_string(meta)?;
    write(&path, json).await?;
    Ok(path)
}

/// Package format, from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
    Apk,
    Xapk,
    Unknown,
}

impl PackageKind {
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".xapk") {
            PackageKind::Xapk
        } else if lower.ends_with(".apk") {
            PackageKind::Apk
        } else {
            PackageKind::Unknown
        }
    }
}

impl std::fmt::Display for PackageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PackageKind::Apk => write!(f, "APK"),
            PackageKind::Xapk => write!(f, "XAPK"),
            PackageKind::Unknown => write!(f, "Unknown"),
        }
    }
}

/// One report directory under a reports root
#[derive(Debug, Clone, Serialize)]
pub struct StoredReport {
    pub id: String,
    /// Package file name, when `meta.json` is present
    pub package: Option<String>,
    pub kind: PackageKind,
    pub modified: DateTime<Utc>,
    pub has_results: bool,
    pub traffic_patch: bool,
    pub patched_package: Option<String>,
}

/// Report directories under `root`, newest first.
///
/// A missing root is an empty store. Hidden directories are skipped.
pub fn list_reports(root: &Path) -> Result<Vec<StoredReport>> {
    let mut reports = Vec::new();
    if !root.is_dir() {
        return Ok(reports);
    }

    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let id = entry.file_name().to_string_lossy().into_owned();
        if !entry.file_type()?.is_dir() || id.starts_with('.') {
            continue;
        }

        let dir = entry.path();
        let meta = match std::fs::read_to_string(dir.join(META_FILE)) {
            Ok(content) => match serde_json::from_str::<ReportMeta>(&content) {
                Ok(meta) => Some(meta),
                Err(e) => {
                    debug!("Ignoring unreadable metadata in {}: {}", dir.display(), e);
                    None
                }
            },
            Err(_) => None,
        };
        let modified: DateTime<Utc> = entry.metadata()?.modified()?.into();
        let package = meta.as_ref().map(|m| m.original_package.clone());

        reports.push(StoredReport {
            kind: package
                .as_deref()
                .map(PackageKind::from_name)
                .unwrap_or(PackageKind::Unknown),
            has_results: dir.join(RESULTS_FILE).is_file(),
            traffic_patch: meta.as_ref().map(|m| m.traffic_patch).unwrap_or(false),
            patched_package: meta.and_then(|m| m.patched_package),
            package,
            modified,
            id,
        });
    }

    reports.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.id.cmp(&a.id)));
    Ok(reports)
}

/// Delete one report directory
pub fn delete_report(root: &Path, id: &str) -> Result<()> {
    if id.is_empty() || id.starts_with('.') || id.contains(['/', '\\']) {
        return Err(ScanError::Validation(format!("invalid report id: {:?}", id)));
    }

    let dir = root.join(id);
    if !dir.is_dir() {
        return Err(ScanError::NotFound(format!("report {}", id)));
    }
    std::fs::remove_dir_all(&dir)
        .map_err(|e| ScanError::Export(format!("failed to delete report {}: {}", id, e)))?;
    info!("Report {} deleted", id);
    Ok(())
}
