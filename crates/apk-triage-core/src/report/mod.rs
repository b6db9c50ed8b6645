//! Merging scan and analyzer output into a report

mod export;
mod webhook;

pub use export::{
    delete_report, list_reports, write_meta, write_reports, ExportPaths, PackageKind, ReportMeta,
    StoredReport, META_FILE, REPORT_FILE, RESULTS_FILE,
};
pub use webhook::WebhookNotifier;

use crate::analyzer::{AndroidManifest, AnalyzerFailure, AnalyzerRun};
use crate::cache::DecompiledTree;
use crate::scan::{count_relevant_files, ScanOutput};
use crate::types::Severity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// What was analyzed
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportSubject {
    pub package_file: String,
    pub package_name: Option<String>,
    pub version: Option<String>,
}

/// Findings reported under one category
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryReport {
    pub count: usize,
    pub findings: Vec<String>,
}

/// Findings bucketed by the risk implied by their category name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskBreakdown {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

/// Report-wide statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_files_scanned: usize,
    pub total_patterns: usize,
    pub vulnerability_count: usize,
    pub risk_breakdown: RiskBreakdown,
    pub severity_breakdown: BTreeMap<Severity, usize>,
    pub failed_analyzers: Vec<AnalyzerFailure>,
    pub partial_decompile: bool,
    pub cache_hit: bool,
}

/// Final result of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub subject: ReportSubject,
    pub generated_at: DateTime<Utc>,
    pub categories: BTreeMap<String, CategoryReport>,
    /// Informational analyzer results, keyed by category
    pub notes: BTreeMap<String, Vec<String>>,
    pub summary: ReportSummary,
}

impl Report {
    /// Number of findings across every category
    pub fn total_findings(&self) -> usize {
        self.categories.values().map(|c| c.count).sum()
    }

    /// Category name to rendered findings, the `results.json` layout
    pub fn results_map(&self) -> BTreeMap<&str, &[String]> {
        self.categories
            .iter()
            .map(|(name, category)| (name.as_str(), category.findings.as_slice()))
            .collect()
    }
}

/// Risk bucket for a category name
pub fn risk_for_category(category: &str) -> Severity {
    let lower = category.to_lowercase();
    if lower.contains("high") || lower.contains("critical") {
        Severity::High
    } else if lower.contains("medium") {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Builds reports; has no side effects beyond reading the tree
pub struct ResultAggregator {
    total_patterns: usize,
}

impl ResultAggregator {
    pub fn new(total_patterns: usize) -> Self {
        Self { total_patterns }
    }

    /// Merge scan and analyzer output into a report
    pub fn aggregate(
        &self,
        package: &Path,
        tree: &DecompiledTree,
        scan: ScanOutput,
        analyzers: AnalyzerRun,
    ) -> Report {
        let mut categories: BTreeMap<String, CategoryReport> = BTreeMap::new();
        let mut notes: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut severity_breakdown: BTreeMap<Severity, usize> = BTreeMap::new();

        for (name, mut findings) in scan.findings {
            if findings.is_empty() {
                continue;
            }
            findings.sort_by(|a, b| a.file.cmp(&b.file));
            categories
                .entry(name)
                .or_default()
                .findings
                .extend(findings.iter().map(ToString::to_string));
        }

        for output in analyzers.outputs {
            for finding in output.findings {
                if finding.is_informational() {
                    notes.entry(output.category.clone()).or_default().push(finding.title);
                    continue;
                }
                *severity_breakdown.entry(finding.severity).or_default() += 1;
                categories
                    .entry(output.category.clone())
                    .or_default()
                    .findings
                    .push(finding.to_string());
            }
        }

        let mut risk_breakdown = RiskBreakdown::default();
        for (name, category) in categories.iter_mut() {
            category.count = category.findings.len();
            match risk_for_category(name) {
                Severity::High => risk_breakdown.high += category.count,
                Severity::Medium => risk_breakdown.medium += category.count,
                _ => risk_breakdown.low += category.count,
            }
        }
        let vulnerability_count = categories.values().map(|c| c.count).sum();

        let total_files_scanned = count_relevant_files(&tree.root);
        if total_files_scanned != scan.files_scanned {
            debug!(
                "Tree walk counted {} files, scan read {}",
                total_files_scanned, scan.files_scanned
            );
        }

        Report {
            subject: subject_for(package, tree),
            generated_at: Utc::now(),
            categories,
            notes,
            summary: ReportSummary {
                total_files_scanned,
                total_patterns: self.total_patterns,
                vulnerability_count,
                risk_breakdown,
                severity_breakdown,
                failed_analyzers: analyzers.failures,
                partial_decompile: tree.partial,
                cache_hit: tree.cache_hit,
            },
        }
    }
}

fn subject_for(package: &Path, tree: &DecompiledTree) -> ReportSubject {
    let manifest = tree
        .manifest_path()
        .and_then(|path| AndroidManifest::load(&path).ok());

    ReportSubject {
        package_file: package
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| package.display().to_string()),
        package_name: manifest.as_ref().and_then(|m| m.package.clone()),
        version: manifest.and_then(|m| m.version_name),
    }
}
