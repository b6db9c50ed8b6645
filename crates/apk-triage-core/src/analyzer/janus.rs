//! Janus (CVE-2017-13156) analyzer
//!
//! Packages signed only with the v1 JAR scheme and installable on Android
//! versions before 7.0 can have a DEX file prepended without breaking the
//! signature.

use super::{AndroidManifest, VulnerabilityAnalyzer};
use crate::cache::DecompiledTree;
use crate::error::{Result, ScanError};
use crate::types::{AnalyzerFinding, Severity};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

const NAME: &str = "JanusVulnerabilityAnalyzer";

/// Magic that closes an APK Signing Block (v2 and later schemes)
const SIGNING_BLOCK_MAGIC: &[u8] = b"APK Sig Block 42";

/// First API level that enforces v2 signatures
const FIXED_API_LEVEL: u32 = 24;

/// Analyzer for the Janus signature bypass
#[derive(Default)]
pub struct JanusVulnerabilityAnalyzer {
    subject: Option<PathBuf>,
}

impl JanusVulnerabilityAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }
}

fn has_signing_block(bytes: &[u8]) -> bool {
    bytes
        .windows(SIGNING_BLOCK_MAGIC.len())
        .any(|w| w == SIGNING_BLOCK_MAGIC)
}

#[async_trait]
impl VulnerabilityAnalyzer for JanusVulnerabilityAnalyzer {
    fn name(&self) -> &str {
        NAME
    }

    async fn analyze(&self, tree: &DecompiledTree) -> Result<Vec<AnalyzerFinding>> {
        let subject = self
            .subject
            .as_ref()
            .ok_or_else(|| ScanError::analyzer(NAME, "package path was not provided"))?;

        let min_sdk = match tree.manifest_path() {
            Some(path) => AndroidManifest::load(&path)
                .map_err(|e| ScanError::analyzer(NAME, e.to_string()))?
                .min_sdk,
            None => None,
        };
        if matches!(min_sdk, Some(level) if level >= FIXED_API_LEVEL) {
            debug!("minSdkVersion {:?} is not affected by Janus", min_sdk);
            return Ok(Vec::new());
        }

        let bytes = tokio::fs::read(subject).await.map_err(|e| {
            ScanError::analyzer(NAME, format!("failed to read {}: {}", subject.display(), e))
        })?;
        if has_signing_block(&bytes) {
            return Ok(Vec::new());
        }

        let sdk = min_sdk.map_or_else(|| "unset".to_string(), |l| l.to_string());
        Ok(vec![AnalyzerFinding::new(Severity::High, "Janus Vulnerability (CVE-2017-13156)")
            .with_artifact(subject.display().to_string())
            .with_description([
                "Package is signed with the v1 scheme only".to_string(),
                format!("minSdkVersion is {} (below {})", sdk, FIXED_API_LEVEL),
                "A DEX payload can be prepended without invalidating the signature".to_string(),
            ])])
    }

    fn set_subject_path(&mut self, path: &Path) {
        self.subject = Some(path.to_path_buf());
    }
}
