//! Pattern source loader

use super::PatternDef;
use crate::error::{Result, ScanError};
use std::path::Path;
use tracing::debug;

/// Source format of a pattern file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternFormat {
    Yaml,
    Toml,
}

impl PatternFormat {
    /// `.toml` files are TOML, anything else is treated as YAML
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => PatternFormat::Toml,
            _ => PatternFormat::Yaml,
        }
    }
}

#[derive(serde::Deserialize)]
struct PatternsFile {
    #[serde(default)]
    patterns: Vec<PatternDef>,
}

/// Loader for pattern definition files
pub struct PatternLoader;

impl PatternLoader {
    /// Create a new pattern loader
    pub fn new() -> Self {
        Self
    }

    /// Load pattern definitions from a file
    pub fn load_from_file(&self, path: &Path) -> Result<Vec<PatternDef>> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ScanError::Config(format!(
                "Failed to read patterns file {}: {}",
                path.display(),
                e
            ))
        })?;
        debug!("Loading patterns from: {}", path.display());
        self.parse(&content, PatternFormat::from_path(path))
            .map_err(|e| ScanError::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Parse pattern definitions in the given format
    pub fn parse(&self, content: &str, format: PatternFormat) -> Result<Vec<PatternDef>> {
        let file: PatternsFile = match format {
            PatternFormat::Yaml => serde_yaml::from_str(content)?,
            PatternFormat::Toml => toml::from_str(content)?,
        };
        Ok(file.patterns)
    }
}

impl Default for PatternLoader {
    fn default() -> Self {
        Self::new()
    }
}
