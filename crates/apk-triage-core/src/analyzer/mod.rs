//! Vulnerability analyzers run against a decompiled tree

mod cert_pinning;
mod debug_mode;
mod insecure_storage;
mod janus;
pub mod manifest;
mod search;
mod task_hijacking;

pub use cert_pinning::CertificatePinningAnalyzer;
pub use debug_mode::DebugModeAnalyzer;
pub use insecure_storage::InsecureStorageAnalyzer;
pub use janus::JanusVulnerabilityAnalyzer;
pub use manifest::{Activity, AndroidManifest};
pub use search::{search_tree, tree_contains};
pub use task_hijacking::TaskHijackingAnalyzer;

use crate::cache::DecompiledTree;
use crate::error::{Result, ScanError};
use crate::types::{AnalyzerFinding, ScanConfig};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

/// Trait for vulnerability analyzers
#[async_trait]
pub trait VulnerabilityAnalyzer: Send + Sync {
    /// Get the analyzer name; the report category is derived from it
    fn name(&self) -> &str;

    /// Analyze the decompiled tree and return findings
    async fn analyze(&self, tree: &DecompiledTree) -> Result<Vec<AnalyzerFinding>>;

    /// Receive the path of the package being analyzed.
    ///
    /// Most analyzers only look at the tree and ignore it.
    fn set_subject_path(&mut self, _path: &Path) {}
}

/// Category for an analyzer name: the name without its `Analyzer` suffix
pub fn category_for(name: &str) -> String {
    name.strip_suffix("Analyzer").unwrap_or(name).to_string()
}

struct RegisteredAnalyzer {
    category: String,
    analyzer: Box<dyn VulnerabilityAnalyzer>,
}

/// Findings from one analyzer
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzerOutput {
    pub category: String,
    pub findings: Vec<AnalyzerFinding>,
}

/// An analyzer that returned an error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerFailure {
    pub category: String,
    pub error: String,
}

/// Result of running every registered analyzer
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalyzerRun {
    pub outputs: Vec<AnalyzerOutput>,
    pub failures: Vec<AnalyzerFailure>,
}

/// Ordered collection of analyzers
#[derive(Default)]
pub struct AnalyzerRegistry {
    analyzers: Vec<RegisteredAnalyzer>,
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard analyzer set for a configuration
    pub fn standard(config: &ScanConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(TaskHijackingAnalyzer::new()));
        registry.register(Box::new(InsecureStorageAnalyzer::new()));
        registry.register(Box::new(CertificatePinningAnalyzer::new()));
        registry.register(Box::new(DebugModeAnalyzer::new()));
        if config.janus_scan {
            registry.register(Box::new(JanusVulnerabilityAnalyzer::new()));
        }
        registry
    }

    pub fn register(&mut self, analyzer: Box<dyn VulnerabilityAnalyzer>) {
        let category = category_for(analyzer.name());
        debug!("Registered analyzer {} as {}", analyzer.name(), category);
        self.analyzers.push(RegisteredAnalyzer { category, analyzer });
    }

    pub fn len(&self) -> usize {
        self.analyzers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analyzers.is_empty()
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.analyzers.iter().map(|a| a.category.as_str())
    }

    /// Run every analyzer; a failing analyzer is recorded and skipped
    pub async fn run(&mut self, tree: &DecompiledTree, subject: Option<&Path>) -> AnalyzerRun {
        let mut run = AnalyzerRun::default();

        for entry in &mut self.analyzers {
            if let Some(path) = subject {
                entry.analyzer.set_subject_path(path);
            }

            match entry.analyzer.analyze(tree).await {
                Ok(findings) => {
                    debug!(
                        "Analyzer {} produced {} results",
                        entry.analyzer.name(),
                        findings.len()
                    );
                    run.outputs.push(AnalyzerOutput {
                        category: entry.category.clone(),
                        findings,
                    });
                }
                Err(e) => {
                    warn!("Analyzer {} failed: {}", entry.analyzer.name(), e);
                    run.failures.push(AnalyzerFailure {
                        category: entry.category.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        run
    }
}

/// Run blocking tree work off the async executor
pub(crate) async fn blocking<T, F>(analyzer: &str, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ScanError::analyzer(analyzer, format!("task failed: {}", e)))?
}
