//! Task hijacking analyzer
//!
//! Activities launched as `singleTask` share a task affinity that another app
//! can claim, letting it place its own activity on top of the victim's task.

use super::{blocking, AndroidManifest, VulnerabilityAnalyzer};
use crate::cache::DecompiledTree;
use crate::error::{Result, ScanError};
use crate::types::{AnalyzerFinding, Severity};
use async_trait::async_trait;

const NAME: &str = "TaskHijackingAnalyzer";

/// Analyzer for singleTask activities
pub struct TaskHijackingAnalyzer;

impl TaskHijackingAnalyzer {
    /// Create a new task hijacking analyzer
    pub fn new() -> Self {
        Self
    }

    fn evaluate(manifest: &AndroidManifest, manifest_rel: &str) -> Vec<AnalyzerFinding> {
        let mut findings: Vec<AnalyzerFinding> = manifest
            .single_task_activities()
            .map(|activity| {
                let (severity, exposure) = if activity.is_exported() {
                    (Severity::High, "public")
                } else {
                    (Severity::Medium, "non-public")
                };

                AnalyzerFinding::new(severity, "Task Hijacking Vulnerability")
                    .with_artifact(activity.name.clone())
                    .with_description([
                        format!(
                            "Activity configured with singleTask launch mode ({})",
                            activity.launch_mode.as_deref().unwrap_or_default()
                        ),
                        format!(
                            "{} risk due to {} export status (exported: {})",
                            severity,
                            exposure,
                            activity.exported.as_deref().unwrap_or("unset")
                        ),
                        "Vulnerable to task hijacking attacks".to_string(),
                    ])
                    .with_evidence(vec![manifest_rel.to_string()])
            })
            .collect();

        if findings.is_empty() {
            findings.push(AnalyzerFinding::info("No task hijacking vulnerabilities found"));
        } else {
            let count = findings.len();
            findings.push(AnalyzerFinding::info(format!(
                "Found {} task hijacking {}",
                count,
                if count == 1 { "vulnerability" } else { "vulnerabilities" }
            )));
        }
        findings
    }
}

impl Default for TaskHijackingAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VulnerabilityAnalyzer for TaskHijackingAnalyzer {
    fn name(&self) -> &str {
        NAME
    }

    async fn analyze(&self, tree: &DecompiledTree) -> Result<Vec<AnalyzerFinding>> {
        let path = tree
            .manifest_path()
            .ok_or_else(|| ScanError::analyzer(NAME, "AndroidManifest.xml not found"))?;
        let manifest_rel = tree.relative(&path);

        let manifest = blocking(NAME, move || AndroidManifest::load(&path))
            .await
            .map_err(|e| ScanError::analyzer(NAME, e.to_string()))?;

        Ok(Self::evaluate(&manifest, &manifest_rel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_with_manifest(dir: &std::path::Path, manifest: &str) -> DecompiledTree {
        std::fs::create_dir_all(dir.join("resources")).unwrap();
        std::fs::write(dir.join("resources/AndroidManifest.xml"), manifest).unwrap();
        DecompiledTree::from_dir(dir)
    }

    #[tokio::test]
    async fn test_exported_single_task_is_high() {
        let dir = tempfile::tempdir().unwrap();
        let tree = tree_with_manifest(
            dir.path(),
            r#"<manifest xmlns:android="http://schemas.android.com/apk/res/android" package="com.example">
  <application>
    <activity android:name="com.example.Main" android:launchMode="singleTask" android:exported="true"/>
  </application>
</manifest>"#,
        );

        let findings = TaskHijackingAnalyzer::new().analyze(&tree).await.unwrap();
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].severity, Severity::High);
        assert_eq!(findings[0].artifact.as_deref(), Some("com.example.Main"));
        assert_eq!(findings[0].evidence, vec!["resources/AndroidManifest.xml"]);
        assert!(findings[1].is_informational());
        assert!(findings[1].title.contains("Found 1"));
    }

    #[tokio::test]
    async fn test_unexported_single_task_is_medium() {
        let dir = tempfile::tempdir().unwrap();
        let tree = tree_with_manifest(
            dir.path(),
            r#"<manifest xmlns:android="http://schemas.android.com/apk/res/android">
  <application>
    <activity android:name=".A" android:launchMode="2"/>
    <activity android:name=".B" android:launchMode="standard" android:exported="true"/>
  </application>
</manifest>"#,
        );

        let findings = TaskHijackingAnalyzer::new().analyze(&tree).await.unwrap();
        let vulns: Vec<_> = findings.iter().filter(|f| !f.is_informational()).collect();
        assert_eq!(vulns.len(), 1);
        assert_eq!(vulns[0].severity, Severity::Medium);
    }

    #[tokio::test]
    async fn test_clean_manifest_reports_none_found() {
        let dir = tempfile::tempdir().unwrap();
        let tree = tree_with_manifest(dir.path(), "<manifest><application/></manifest>");

        let findings = TaskHijackingAnalyzer::new().analyze(&tree).await.unwrap();
        assert_eq!(findings.len(), 1);
        assert!(findings[0].is_informational());
    }

    #[tokio::test]
    async fn test_missing_or_broken_manifest_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let tree = DecompiledTree::from_dir(dir.path());
        assert!(TaskHijackingAnalyzer::new().analyze(&tree).await.is_err());

        let tree = tree_with_manifest(dir.path(), "<manifest><application></manifest>");
        let err = TaskHijackingAnalyzer::new().analyze(&tree).await.unwrap_err();
        assert!(matches!(err, ScanError::Analyzer { .. }));
    }
}
