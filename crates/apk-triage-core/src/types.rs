//! Core type definitions for the package triage pipeline

use crate::error::{Result, ScanError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Severity levels for analyzer findings
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Critical security issue
    Critical = 0,
    /// High severity - significant security risk
    High = 1,
    /// Medium severity - potential security concern
    Medium = 2,
    /// Low severity - minor issue or best practice violation
    Low = 3,
    /// Informational - an explicit result that is not a vulnerability
    #[default]
    Info = 4,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Critical => write!(f, "CRITICAL"),
            Severity::High => write!(f, "HIGH"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::Low => write!(f, "LOW"),
            Severity::Info => write!(f, "INFO"),
        }
    }
}

/// Confidence attached to a pattern definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    #[default]
    Medium,
    Low,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::High => write!(f, "high"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::Low => write!(f, "low"),
        }
    }
}

/// A sensitive-string match produced by the scan engine
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Finding {
    /// Pattern name the match was reported under
    pub category: String,
    /// Path relative to the decompiled tree root
    pub file: String,
    /// Trimmed matched text
    #[serde(rename = "match")]
    pub matched: String,
    /// Newline-collapsed text window around the match
    pub context: String,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} (Context: ...{}...)",
            self.file, self.matched, self.context
        )
    }
}

/// A finding produced by a vulnerability analyzer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerFinding {
    /// Severity assigned by the analyzer
    pub severity: Severity,
    /// Short title
    pub title: String,
    /// Affected artifact (activity name, file, package)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
    /// Description bullet points
    #[serde(default)]
    pub description: Vec<String>,
    /// Supporting evidence, usually `path: match` lines
    #[serde(default)]
    pub evidence: Vec<String>,
}

impl AnalyzerFinding {
    /// Create a finding with a severity and title
    pub fn new(severity: Severity, title: impl Into<String>) -> Self {
        Self {
            severity,
            title: title.into(),
            artifact: None,
            description: Vec::new(),
            evidence: Vec::new(),
        }
    }

    /// Informational result
    pub fn info(title: impl Into<String>) -> Self {
        Self::new(Severity::Info, title)
    }

    pub fn with_artifact(mut self, artifact: impl Into<String>) -> Self {
        self.artifact = Some(artifact.into());
        self
    }

    pub fn with_description<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.description.extend(lines.into_iter().map(Into::into));
        self
    }

    pub fn with_evidence(mut self, lines: Vec<String>) -> Self {
        self.evidence.extend(lines);
        self
    }

    /// Whether this is an informational result rather than a vulnerability
    pub fn is_informational(&self) -> bool {
        self.severity == Severity::Info
    }
}

impl fmt::Display for AnalyzerFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.title)?;
        if let Some(ref artifact) = self.artifact {
            write!(f, "\n  Affected: {}", artifact)?;
        }
        if !self.description.is_empty() {
            write!(f, "\n  Description:")?;
            for line in &self.description {
                write!(f, "\n    - {}", line)?;
            }
        }
        if !self.evidence.is_empty() {
            write!(f, "\n  Files:")?;
            for line in &self.evidence {
                write!(f, "\n    {}", line)?;
            }
        }
        Ok(())
    }
}

/// Configuration for the scanner
#[derive(Debug, Clone, Deserialize)]
pub struct ScanConfig {
    /// Pattern source; built-in patterns are used when absent
    #[serde(default)]
    pub patterns_path: Option<PathBuf>,
    /// Scan engine worker count
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Bytes of context captured on each side of a match
    #[serde(default = "default_context_width")]
    pub context_width: usize,
    /// Enable the Janus signature-scheme analyzer
    #[serde(default)]
    pub janus_scan: bool,
    /// Skip the pattern scan and run only the task hijacking analyzer
    #[serde(default)]
    pub task_hijack_only: bool,
    /// Webhook receiving exported reports
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Decompilation cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// External tool configuration
    #[serde(default)]
    pub tools: ToolsConfig,
}

fn default_workers() -> usize {
    10
}

fn default_context_width() -> usize {
    100
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            patterns_path: None,
            workers: default_workers(),
            context_width: default_context_width(),
            janus_scan: false,
            task_hijack_only: false,
            webhook_url: None,
            cache: CacheConfig::default(),
            tools: ToolsConfig::default(),
        }
    }
}

impl ScanConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ScanError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
            .map_err(|e| ScanError::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ScanConfig = toml::from_str(content)?;
        if config.workers == 0 {
            return Err(ScanError::Config("workers must be at least 1".into()));
        }
        Ok(config)
    }
}

/// Decompilation cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Root directory holding one subdirectory per content hash
    #[serde(default = "default_cache_dir")]
    pub directory: PathBuf,
    /// Where the decompiler writes before publication; system temp dir when absent
    #[serde(default)]
    pub scratch_directory: Option<PathBuf>,
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("apk-triage")
        .join("decompiled")
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: default_cache_dir(),
            scratch_directory: None,
        }
    }
}

/// External tool locations and arguments
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_jadx")]
    pub jadx: PathBuf,
    /// Appended after the default jadx arguments
    #[serde(default)]
    pub jadx_args: Vec<String>,
    #[serde(default = "default_apkeep")]
    pub apkeep: PathBuf,
    #[serde(default = "default_apk_mitm")]
    pub apk_mitm: PathBuf,
}

fn default_jadx() -> PathBuf {
    PathBuf::from("jadx")
}

fn default_apkeep() -> PathBuf {
    PathBuf::from("apkeep")
}

fn default_apk_mitm() -> PathBuf {
    PathBuf::from("apk-mitm")
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            jadx: default_jadx(),
            jadx_args: Vec::new(),
            apkeep: default_apkeep(),
            apk_mitm: default_apk_mitm(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finding_display() {
        let finding = Finding {
            category: "Google API Key".to_string(),
            file: "sources/com/example/Keys.java".to_string(),
            matched: "AIzaXYZ".to_string(),
            context: "String key = \"AIzaXYZ\";".to_string(),
        };
        assert_eq!(
            finding.to_string(),
            "sources/com/example/Keys.java: AIzaXYZ (Context: ...String key = \"AIzaXYZ\";...)"
        );
    }

    #[test]
    fn test_analyzer_finding_display() {
        let finding = AnalyzerFinding::new(Severity::High, "Debug Mode Enabled")
            .with_artifact("AndroidManifest.xml")
            .with_description(["App allows debugging"]);
        let text = finding.to_string();
        assert!(text.starts_with("[HIGH] Debug Mode Enabled"));
        assert!(text.contains("Affected: AndroidManifest.xml"));
        assert!(text.contains("- App allows debugging"));
    }

    #[test]
    fn test_config_from_toml() {
        let config = ScanConfig::from_toml_str(
            r#"
workers = 4
janus_scan = true

[cache]
directory = "/var/cache/apk-triage"

[tools]
jadx_args = ["--threads-count", "2"]
"#,
        )
        .unwrap();

        assert_eq!(config.workers, 4);
        assert_eq!(config.context_width, 100);
        assert!(config.janus_scan);
        assert!(!config.task_hijack_only);
        assert_eq!(config.cache.directory, PathBuf::from("/var/cache/apk-triage"));
        assert_eq!(config.tools.jadx, PathBuf::from("jadx"));
        assert_eq!(config.tools.jadx_args.len(), 2);
    }

    #[test]
    fn test_config_rejects_zero_workers() {
        assert!(ScanConfig::from_toml_str("workers = 0").is_err());
    }
}
