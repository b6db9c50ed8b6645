//! APK Triage Core Library
//!
//! Static security triage for Android packages: decompiles a package once per
//! content hash, scans the decompiled tree for sensitive strings and runs
//! vulnerability analyzers over it, then aggregates everything into a report.

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod analyzer;
pub mod cache;
pub mod error;
pub mod jobs;
pub mod patterns;
pub mod report;
pub mod scan;
pub mod tools;
pub mod types;

pub use error::{JobError, Result, ScanError};
pub use types::*;

use analyzer::{
    AnalyzerOutput, AnalyzerRegistry, AnalyzerRun, TaskHijackingAnalyzer, VulnerabilityAnalyzer,
};
use cache::{DecompilationCache, DecompiledTree};
use patterns::PatternRegistry;
use report::{write_reports, ExportPaths, Report, ResultAggregator, WebhookNotifier};
use scan::{ScanEngine, ScanOutput};
use std::path::Path;
use std::sync::Arc;
use tools::{Decompiler, Jadx};
use tracing::{debug, info, warn};

/// Category used when only the task hijacking analyzer runs
pub const TASK_HIJACKING_ONLY_CATEGORY: &str = "Task Hijacking Vulnerabilities";

/// Builds the analyzer set for each scan
pub type AnalyzerFactory = Arc<dyn Fn(&ScanConfig) -> AnalyzerRegistry + Send + Sync>;

/// Main scanner that wires the pipeline together
pub struct Scanner {
    config: ScanConfig,
    patterns: Arc<PatternRegistry>,
    engine: ScanEngine,
    cache: DecompilationCache,
    analyzers: AnalyzerFactory,
}

impl Scanner {
    /// Create a new scanner with the given configuration
    pub fn new(config: ScanConfig) -> Result<Self> {
        let patterns = match config.patterns_path {
            Some(ref path) => PatternRegistry::load(path)?,
            None => PatternRegistry::builtin(),
        };
        let decompiler: Arc<dyn Decompiler> = Arc::new(Jadx::new(
            config.tools.jadx.clone(),
            config.tools.jadx_args.clone(),
        ));
        Self::with_components(config, patterns, decompiler)
    }

    /// Create a scanner with default configuration
    pub fn with_defaults() -> Result<Self> {
        Self::new(ScanConfig::default())
    }

    /// Create a scanner from already-built parts
    pub fn with_components(
        config: ScanConfig,
        patterns: PatternRegistry,
        decompiler: Arc<dyn Decompiler>,
    ) -> Result<Self> {
        let mut cache = DecompilationCache::new(config.cache.directory.clone(), decompiler)?;
        if let Some(ref scratch) = config.cache.scratch_directory {
            cache = cache.with_scratch_dir(scratch.clone());
        }

        let analyzers: AnalyzerFactory = Arc::new(AnalyzerRegistry::standard);
        Ok(Self {
            engine: ScanEngine::new(config.workers, config.context_width),
            patterns: Arc::new(patterns),
            cache,
            analyzers,
            config,
        })
    }

    /// Replace the analyzer set
    pub fn with_analyzers(mut self, factory: AnalyzerFactory) -> Self {
        self.analyzers = factory;
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn patterns(&self) -> &PatternRegistry {
        &self.patterns
    }

    pub fn cache(&self) -> &DecompilationCache {
        &self.cache
    }

    /// Decompile (or reuse), scan and analyze a package
    pub async fn scan_package(&self, package: &Path) -> Result<Report> {
        let start = std::time::Instant::now();
        validate_package(package)?;
        info!("Scanning package: {}", package.display());

        let tree = self.cache.resolve(package).await?;
        debug!(
            "Decompiled tree at {} (cache hit: {}, partial: {})",
            tree.root.display(),
            tree.cache_hit,
            tree.partial
        );

        let (scan, analyzer_run, total_patterns) = if self.config.task_hijack_only {
            let run = task_hijacking_only(&tree).await?;
            (ScanOutput::default(), run, 0)
        } else {
            // Pattern scan runs on the blocking pool while analyzers run here
            let engine = self.engine.clone();
            let patterns = Arc::clone(&self.patterns);
            let root = tree.root.clone();
            let scan_task = tokio::task::spawn_blocking(move || engine.scan(&root, &patterns));

            let mut registry = (self.analyzers)(&self.config);
            let (scan, run) = tokio::join!(scan_task, registry.run(&tree, Some(package)));
            let scan =
                scan.map_err(|e| ScanError::Internal(format!("scan task failed: {}", e)))??;
            (scan, run, self.patterns.len())
        };

        let aggregator = ResultAggregator::new(total_patterns);
        let subject = package.to_path_buf();
        let report = tokio::task::spawn_blocking(move || {
            aggregator.aggregate(&subject, &tree, scan, analyzer_run)
        })
        .await
        .map_err(|e| ScanError::Internal(format!("aggregation task failed: {}", e)))?;

        info!(
            "Scan complete: {} findings in {} categories ({:?})",
            report.total_findings(),
            report.categories.len(),
            start.elapsed()
        );
        Ok(report)
    }

    /// Scan a package, write reports to `out_dir` and notify the configured webhook
    pub async fn scan_and_export(
        &self,
        package: &Path,
        out_dir: &Path,
    ) -> Result<(Report, ExportPaths)> {
        let report = self.scan_package(package).await?;
        let paths = write_reports(&report, out_dir).await?;

        if let Some(ref url) = self.config.webhook_url {
            self.notify(url, &report, &paths).await;
        }
        Ok((report, paths))
    }

    /// Post exported results to a webhook; failures are logged, never returned
    pub async fn notify(&self, url: &str, report: &Report, paths: &ExportPaths) {
        let subject = report
            .subject
            .package_name
            .clone()
            .unwrap_or_else(|| report.subject.package_file.clone());

        let sent = match WebhookNotifier::new(url) {
            Ok(notifier) => notifier.notify(&paths.results, None, &subject).await,
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            warn!("Failed to send results to webhook: {}", e);
        }
    }
}

/// Run the task hijacking analyzer alone; its failure fails the scan
async fn task_hijacking_only(tree: &DecompiledTree) -> Result<AnalyzerRun> {
    info!("Task hijacking only: skipping pattern scan");
    let findings = TaskHijackingAnalyzer::new().analyze(tree).await?;
    Ok(AnalyzerRun {
        outputs: vec![AnalyzerOutput {
            category: TASK_HIJACKING_ONLY_CATEGORY.to_string(),
            findings,
        }],
        failures: Vec::new(),
    })
}

fn validate_package(package: &Path) -> Result<()> {
    let metadata = std::fs::metadata(package).map_err(|e| {
        ScanError::Validation(format!("cannot access {}: {}", package.display(), e))
    })?;
    if !metadata.is_file() {
        return Err(ScanError::Validation(format!(
            "{} is not a file",
            package.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolStatus;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const KEY: &str = "AIzaSyFAKEKEY1234567890ABCDEFGHIJKLMN";

    /// Writes a fixed set of files and counts invocations
    struct FixtureDecompiler {
        files: Vec<(&'static str, String)>,
        calls: AtomicUsize,
    }

    impl FixtureDecompiler {
        fn new(files: Vec<(&'static str, String)>) -> Arc<Self> {
            Arc::new(Self {
                files,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Decompiler for FixtureDecompiler {
        async fn decompile(&self, _package: &Path, output_dir: &Path) -> Result<ToolStatus> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::fs::create_dir_all(output_dir.join("sources"))?;
            for (rel, content) in &self.files {
                let path = output_dir.join(rel);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, content)?;
            }
            Ok(ToolStatus::succeeded())
        }

        fn name(&self) -> &str {
            "fixture"
        }
    }

    struct FailingAnalyzer;

    #[async_trait]
    impl VulnerabilityAnalyzer for FailingAnalyzer {
        fn name(&self) -> &str {
            "FailingAnalyzer"
        }

        async fn analyze(&self, _tree: &DecompiledTree) -> Result<Vec<AnalyzerFinding>> {
            Err(ScanError::analyzer("Failing", "always fails"))
        }
    }

    fn config(dir: &Path) -> ScanConfig {
        ScanConfig {
            cache: CacheConfig {
                directory: dir.join("cache"),
                scratch_directory: Some(dir.join("scratch")),
            },
            workers: 4,
            ..Default::default()
        }
    }

    fn google_patterns() -> PatternRegistry {
        PatternRegistry::from_yaml_str(
            "patterns:\n  - name: \"Google API Key\"\n    regex: 'AIza[0-9A-Za-z\\-_]{33}'\n",
        )
        .unwrap()
    }

    fn package(dir: &Path, bytes: &[u8]) -> PathBuf {
        let path = dir.join("app.apk");
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn vulnerable_manifest() -> String {
        r#"<manifest xmlns:android="http://schemas.android.com/apk/res/android"
    package="com.example">
  <application android:debuggable="true">
    <activity android:name="com.example.Main"
        android:launchMode="singleTask" android:exported="true"/>
  </application>
</manifest>"#
            .to_string()
    }

    const PINNED: &str = "class Net { CertificatePinner p; }";

    #[tokio::test]
    async fn test_scanner_creation() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = Scanner::new(config(dir.path()));
        assert!(scanner.is_ok());
        assert!(!scanner.unwrap().patterns().is_empty());
    }

    #[tokio::test]
    async fn test_single_secret_scan() {
        let dir = tempfile::tempdir().unwrap();
        let decompiler = FixtureDecompiler::new(vec![
            (
                "sources/com/example/Config.java",
                format!("class Config {{ String key = \"{}\"; }}", KEY),
            ),
            ("sources/com/example/Net.java", PINNED.to_string()),
        ]);
        let scanner =
            Scanner::with_components(config(dir.path()), google_patterns(), decompiler).unwrap();

        let report = scanner.scan_package(&package(dir.path(), b"one")).await.unwrap();
        let category = &report.categories["Google API Key"];
        assert_eq!(category.count, 1);
        let expected = format!("sources/com/example/Config.java: {}", KEY);
        assert!(category.findings[0].starts_with(&expected));
        assert_eq!(report.total_findings(), 1);
        assert_eq!(report.summary.total_files_scanned, 2);
        // No manifest: task hijacking records a failure, others keep running
        assert_eq!(report.summary.failed_analyzers.len(), 1);
        assert_eq!(report.summary.failed_analyzers[0].category, "TaskHijacking");
    }

    #[tokio::test]
    async fn test_clean_scan() {
        let dir = tempfile::tempdir().unwrap();
        let decompiler = FixtureDecompiler::new(vec![
            ("resources/AndroidManifest.xml", "<manifest><application/></manifest>".to_string()),
            ("sources/com/example/Main.java", "class Main {}".to_string()),
            ("sources/com/example/Net.java", PINNED.to_string()),
        ]);
        let scanner =
            Scanner::with_components(config(dir.path()), google_patterns(), decompiler).unwrap();

        let report = scanner.scan_package(&package(dir.path(), b"clean")).await.unwrap();
        assert_eq!(report.total_findings(), 0);
        assert!(report.summary.failed_analyzers.is_empty());
        assert_eq!(report.notes["TaskHijacking"].len(), 1);
    }

    #[tokio::test]
    async fn test_exported_single_task_and_debuggable() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = vulnerable_manifest();
        let decompiler = FixtureDecompiler::new(vec![
            ("resources/AndroidManifest.xml", manifest),
            ("sources/com/example/Net.java", PINNED.to_string()),
        ]);
        let scanner =
            Scanner::with_components(config(dir.path()), google_patterns(), decompiler).unwrap();

        let report = scanner.scan_package(&package(dir.path(), b"vuln")).await.unwrap();
        let hijack = &report.categories["TaskHijacking"];
        assert_eq!(hijack.count, 1);
        assert!(hijack.findings[0].starts_with("[HIGH] Task Hijacking Vulnerability"));
        assert!(hijack.findings[0].contains("com.example.Main"));
        assert_eq!(report.categories["DebugMode"].count, 1);
        assert_eq!(report.summary.severity_breakdown[&Severity::High], 2);
        assert_eq!(report.subject.package_name.as_deref(), Some("com.example"));
    }

    #[tokio::test]
    async fn test_failing_analyzer_keeps_other_results() {
        let dir = tempfile::tempdir().unwrap();
        let decompiler = FixtureDecompiler::new(vec![(
            "sources/com/example/Config.java",
            format!("String key = \"{}\";", KEY),
        )]);
        let scanner = Scanner::with_components(config(dir.path()), google_patterns(), decompiler)
            .unwrap()
            .with_analyzers(Arc::new(|_: &ScanConfig| {
                let mut registry = AnalyzerRegistry::new();
                registry.register(Box::new(FailingAnalyzer));
                registry.register(Box::new(analyzer::CertificatePinningAnalyzer::new()));
                registry
            }));

        let report = scanner.scan_package(&package(dir.path(), b"mixed")).await.unwrap();
        assert_eq!(report.categories["Google API Key"].count, 1);
        assert_eq!(report.categories["CertificatePinning"].count, 1);
        assert_eq!(report.summary.failed_analyzers[0].category, "Failing");
    }

    #[tokio::test]
    async fn test_repeated_scans_decompile_once() {
        let dir = tempfile::tempdir().unwrap();
        let decompiler = FixtureDecompiler::new(vec![("sources/A.java", "class A {}".to_string())]);
        let scanner =
            Scanner::with_components(config(dir.path()), google_patterns(), decompiler.clone())
                .unwrap();
        let apk = package(dir.path(), b"same bytes");

        for _ in 0..3 {
            scanner.scan_package(&apk).await.unwrap();
        }
        assert_eq!(decompiler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(scanner.cache().entries().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_package_is_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let decompiler = FixtureDecompiler::new(Vec::new());
        let scanner =
            Scanner::with_components(config(dir.path()), google_patterns(), decompiler.clone())
                .unwrap();

        let err = scanner.scan_package(&dir.path().join("absent.apk")).await.unwrap_err();
        assert!(matches!(err, ScanError::Validation(_)));
        let err = scanner.scan_package(dir.path()).await.unwrap_err();
        assert!(matches!(err, ScanError::Validation(_)));
        assert_eq!(decompiler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_scan_and_export_survives_webhook_failure() {
        let dir = tempfile::tempdir().unwrap();
        let decompiler =
            FixtureDecompiler::new(vec![("sources/A.java", format!("k = \"{}\"", KEY))]);
        let mut config = config(dir.path());
        config.webhook_url = Some("http://127.0.0.1:9/hook".to_string());
        let scanner = Scanner::with_components(config, google_patterns(), decompiler).unwrap();

        let out = dir.path().join("out");
        let (report, paths) = scanner
            .scan_and_export(&package(dir.path(), b"export"), &out)
            .await
            .unwrap();
        assert_eq!(report.total_findings(), 1);
        assert!(paths.results.is_file());
        assert!(paths.report.is_file());
    }

    #[tokio::test]
    async fn test_task_hijack_only_skips_pattern_scan() {
        let dir = tempfile::tempdir().unwrap();
        let decompiler = FixtureDecompiler::new(vec![
            ("resources/AndroidManifest.xml", vulnerable_manifest()),
            (
                "sources/com/example/Config.java",
                format!("class Config {{ String key = \"{}\"; }}", KEY),
            ),
        ]);
        let mut config = config(dir.path());
        config.task_hijack_only = true;
        let scanner = Scanner::with_components(config, google_patterns(), decompiler).unwrap();

        let report = scanner.scan_package(&package(dir.path(), b"hijack")).await.unwrap();
        let categories: Vec<&str> = report.categories.keys().map(String::as_str).collect();
        assert_eq!(categories, vec![TASK_HIJACKING_ONLY_CATEGORY]);
        assert_eq!(report.categories[TASK_HIJACKING_ONLY_CATEGORY].count, 1);
        assert!(!report.categories.contains_key("Google API Key"));
        assert!(!report.categories.contains_key("DebugMode"));
        assert_eq!(report.summary.total_patterns, 0);
        assert_eq!(report.notes[TASK_HIJACKING_ONLY_CATEGORY].len(), 1);
    }

    #[tokio::test]
    async fn test_task_hijack_only_requires_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let decompiler = FixtureDecompiler::new(vec![("sources/A.java", "class A {}".to_string())]);
        let mut config = config(dir.path());
        config.task_hijack_only = true;
        let scanner = Scanner::with_components(config, google_patterns(), decompiler).unwrap();

        let err = scanner.scan_package(&package(dir.path(), b"bare")).await.unwrap_err();
        assert!(matches!(err, ScanError::Analyzer { .. }));
    }
}
