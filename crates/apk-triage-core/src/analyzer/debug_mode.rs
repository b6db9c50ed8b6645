//! Debuggable build analyzer

use super::{AndroidManifest, VulnerabilityAnalyzer};
use crate::cache::DecompiledTree;
use crate::error::Result;
use crate::types::{AnalyzerFinding, Severity};
use async_trait::async_trait;
use tracing::debug;

const NAME: &str = "DebugModeAnalyzer";

/// Flags manifests whose application is debuggable
pub struct DebugModeAnalyzer;

impl DebugModeAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DebugModeAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VulnerabilityAnalyzer for DebugModeAnalyzer {
    fn name(&self) -> &str {
        NAME
    }

    async fn analyze(&self, tree: &DecompiledTree) -> Result<Vec<AnalyzerFinding>> {
        let Some(path) = tree.manifest_path() else {
            debug!("No manifest in {}, skipping debug mode check", tree.root.display());
            return Ok(Vec::new());
        };

        let content = tokio::fs::read_to_string(&path).await?;
        let debuggable = match AndroidManifest::parse(&content) {
            Ok(manifest) => manifest.debuggable,
            Err(e) => {
                debug!("Manifest did not parse ({}), falling back to text match", e);
                content.contains(r#"android:debuggable="true""#)
            }
        };

        if !debuggable {
            return Ok(Vec::new());
        }

        Ok(vec![AnalyzerFinding::new(Severity::High, "Debug Mode Enabled in Production")
            .with_artifact(tree.relative(&path))
            .with_description([
                "android:debuggable=\"true\" found in AndroidManifest.xml",
                "App allows debugging in production build",
                "High security risk for production apps",
            ])])
    }
}
