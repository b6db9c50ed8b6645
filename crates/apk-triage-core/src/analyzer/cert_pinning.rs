//! Certificate pinning analyzer

use super::{blocking, tree_contains, VulnerabilityAnalyzer};
use crate::cache::DecompiledTree;
use crate::error::Result;
use crate::types::{AnalyzerFinding, Severity};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;

const NAME: &str = "CertificatePinningAnalyzer";

lazy_static! {
    /// Any of these counts as a pinning implementation
    static ref PINNING_REGEX: Regex = Regex::new(
        r"CertificatePinner|TrustManager|X509TrustManager|OkHttpClient\.Builder\(\)\.certificatePinner|SSLSocketFactory|TrustManagerFactory"
    )
    .unwrap();
}

/// Reports packages with no sign of certificate pinning.
///
/// Absence of these identifiers is taken as absence of pinning, so custom
/// trust managers that accept everything still count as pinned.
pub struct CertificatePinningAnalyzer;

impl CertificatePinningAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CertificatePinningAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VulnerabilityAnalyzer for CertificatePinningAnalyzer {
    fn name(&self) -> &str {
        NAME
    }

    async fn analyze(&self, tree: &DecompiledTree) -> Result<Vec<AnalyzerFinding>> {
        let root = tree.root.clone();
        let pinned = blocking(NAME, move || Ok(tree_contains(&root, &PINNING_REGEX))).await?;
        if pinned {
            return Ok(Vec::new());
        }

        Ok(vec![AnalyzerFinding::new(
            Severity::Medium,
            "No Certificate Pinning Detected",
        )
        .with_description([
            "No certificate pinning implementation found",
            "App vulnerable to man-in-the-middle attacks",
            "SSL/TLS connections not properly secured",
        ])])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_pinning() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sources")).unwrap();
        let source = "new URL(u).openConnection();";
        std::fs::write(dir.path().join("sources/Net.java"), source).unwrap();

        let findings = CertificatePinningAnalyzer::new()
            .analyze(&DecompiledTree::from_dir(dir.path()))
            .await
            .unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Medium);
    }

    #[tokio::test]
    async fn test_pinner_present() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sources/com/app")).unwrap();
        std::fs::write(
            dir.path().join("sources/com/app/Net.java"),
            "client = new OkHttpClient.Builder().certificatePinner(pinner).build();",
        )
        .unwrap();

        let findings = CertificatePinningAnalyzer::new()
            .analyze(&DecompiledTree::from_dir(dir.path()))
            .await
            .unwrap();
        assert!(findings.is_empty());
    }
}
