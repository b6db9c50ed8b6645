//! Named regular-expression groups used by the scan engine

mod loader;

pub use loader::{PatternFormat, PatternLoader};

use crate::error::{Result, ScanError};
use crate::types::Confidence;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// A pattern as written in a pattern source
#[derive(Debug, Clone, Deserialize)]
pub struct PatternDef {
    /// Category name findings are reported under
    #[serde(default)]
    pub name: String,
    /// Single regex form
    #[serde(default)]
    pub regex: Option<String>,
    /// Multi-alternative form, used when `regex` is absent
    #[serde(default)]
    pub regexes: Vec<String>,
    #[serde(default)]
    pub confidence: Confidence,
}

impl PatternDef {
    pub fn new(name: impl Into<String>, regexes: &[&str], confidence: Confidence) -> Self {
        Self {
            name: name.into(),
            regex: None,
            regexes: regexes.iter().map(|r| r.to_string()).collect(),
            confidence,
        }
    }

    /// Regex sources in declaration order
    pub fn source_regexes(&self) -> Vec<&str> {
        match self.regex.as_deref() {
            Some(single) if !single.is_empty() => vec![single],
            _ => self.regexes.iter().map(String::as_str).collect(),
        }
    }
}

/// Compiled alternatives reported under one name
#[derive(Debug, Clone)]
pub struct PatternGroup {
    pub name: String,
    pub regexes: Vec<Regex>,
    pub confidence: Confidence,
}

/// Validated, compiled pattern set
#[derive(Debug, Clone, Default)]
pub struct PatternRegistry {
    groups: BTreeMap<String, PatternGroup>,
}

impl PatternRegistry {
    /// Load and compile patterns from a YAML or TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let defs = PatternLoader::new().load_from_file(path)?;
        let registry = Self::from_defs(defs)?;
        info!("Loaded {} patterns from {}", registry.len(), path.display());
        Ok(registry)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let defs = PatternLoader::new()
            .parse(content, PatternFormat::Yaml)
            .map_err(|e| ScanError::Config(format!("Failed to parse patterns YAML: {}", e)))?;
        Self::from_defs(defs)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let defs = PatternLoader::new()
            .parse(content, PatternFormat::Toml)
            .map_err(|e| ScanError::Config(format!("Failed to parse patterns TOML: {}", e)))?;
        Self::from_defs(defs)
    }

    /// Compile definitions, skipping invalid entries.
    ///
    /// Fails only when nothing valid remains.
    pub fn from_defs(defs: Vec<PatternDef>) -> Result<Self> {
        let mut groups: BTreeMap<String, PatternGroup> = BTreeMap::new();

        for def in defs {
            let sources = def.source_regexes();
            if def.name.trim().is_empty() || sources.is_empty() {
                warn!("Skipping pattern entry without a name or regex");
                continue;
            }

            let mut compiled = Vec::with_capacity(sources.len());
            for source in sources {
                match Regex::new(source) {
                    Ok(re) => compiled.push(re),
                    Err(e) => warn!("Invalid regex pattern for '{}': {}", def.name, e),
                }
            }

            if compiled.is_empty() {
                continue;
            }

            match groups.get_mut(&def.name) {
                Some(existing) => {
                    debug!("Merging duplicate pattern name '{}'", def.name);
                    existing.regexes.extend(compiled);
                }
                None => {
                    groups.insert(
                        def.name.clone(),
                        PatternGroup {
                            name: def.name,
                            regexes: compiled,
                            confidence: def.confidence,
                        },
                    );
                }
            }
        }

        if groups.is_empty() {
            return Err(ScanError::Config(
                "no valid patterns found in pattern source".into(),
            ));
        }

        Ok(Self { groups })
    }

    /// Built-in pattern set
    pub fn builtin() -> Self {
        // Every built-in regex is valid, so this cannot hit the empty case.
        Self::from_defs(builtin_patterns()).unwrap_or_default()
    }

    /// Number of named patterns
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&PatternGroup> {
        self.groups.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PatternGroup> {
        self.groups.values()
    }
}

fn builtin_patterns() -> Vec<PatternDef> {
    use Confidence::*;

    vec![
        // Cloud provider credentials
        PatternDef::new("Google API Key", &[r"AIza[0-9A-Za-z\-_]{35}"], High),
        PatternDef::new(
            "Google OAuth Client",
            &[r"[0-9]+-[0-9A-Za-z_]{32}\.apps\.googleusercontent\.com"],
            High,
        ),
        PatternDef::new("Firebase Database", &[r"[a-z0-9.\-]+\.firebaseio\.com"], Medium),
        PatternDef::new(
            "AWS Access Key",
            &[r"(A3T[A-Z0-9]|AKIA|AGPA|AIDA|AROA|AIPA|ANPA|ANVA|ASIA)[A-Z0-9]{16}"],
            High,
        ),
        PatternDef::new("AWS S3 Bucket", &[r"[a-z0-9.\-]+\.s3\.amazonaws\.com", r"s3://[a-z0-9.\-]+"], Medium),
        // Third-party service tokens
        PatternDef::new("Slack Token", &[r"xox[baprs]-[0-9a-zA-Z]{10,48}"], High),
        PatternDef::new(
            "Slack Webhook",
            &[r"https://hooks\.slack\.com/services/T[a-zA-Z0-9_]{8}/B[a-zA-Z0-9_]{8,12}/[a-zA-Z0-9_]{24}"],
            High,
        ),
        PatternDef::new("Stripe Key", &[r"(sk|rk)_live_[0-9a-zA-Z]{24,99}"], High),
        PatternDef::new("GitHub Token", &[r"gh[pousr]_[0-9a-zA-Z]{36}"], High),
        PatternDef::new("Twilio Account SID", &[r"AC[a-f0-9]{32}"], Low),
        PatternDef::new("Mailgun Key", &[r"key-[0-9a-zA-Z]{32}"], Medium),
        PatternDef::new(
            "Discord Webhook",
            &[r"https://(ptb\.|canary\.)?discord(app)?\.com/api/webhooks/[0-9]+/[A-Za-z0-9_\-]+"],
            High,
        ),
        // Key material
        PatternDef::new(
            "Private Key",
            &[r"-----BEGIN ((RSA|DSA|EC|OPENSSH|PGP) )?PRIVATE KEY( BLOCK)?-----"],
            High,
        ),
        PatternDef::new(
            "JSON Web Token",
            &[r"eyJ[A-Za-z0-9_\-]{10,}\.eyJ[A-Za-z0-9_\-]{10,}\.[A-Za-z0-9_\-]{10,}"],
            Medium,
        ),
        PatternDef::new(
            "Generic Secret",
            &[r#"(?i)(secret|password|passwd|api_key|apikey|access_token)["']?\s*[:=]\s*["'][^"'\s]{8,}["']"#],
            Low,
        ),
        // Endpoints
        PatternDef::new("URL", &[r#"https?://[A-Za-z0-9.\-]+(:[0-9]+)?(/[^\s"'<>)]*)?"#], Low),
        PatternDef::new(
            "IP Address",
            &[r"\b(25[0-5]|2[0-4][0-9]|1?[0-9]?[0-9])(\.(25[0-5]|2[0-4][0-9]|1?[0-9]?[0-9])){3}\b"],
            Low,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_patterns_compile() {
        let registry = PatternRegistry::builtin();
        assert_eq!(registry.len(), builtin_patterns().len());
        assert!(registry.get("Google API Key").is_some());
    }

    #[test]
    fn test_invalid_regex_is_skipped() {
        let registry = PatternRegistry::from_yaml_str(
            r#"
patterns:
  - name: "Broken"
    regex: '([unclosed'
  - name: "Mixed"
    regexes:
      - '(bad'
      - 'good[0-9]+'
  - name: "Token"
    regex: 'tok_[a-z]{8}'
"#,
        )
        .unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.get("Broken").is_none());
        assert_eq!(registry.get("Mixed").unwrap().regexes.len(), 1);
    }

    #[test]
    fn test_zero_valid_patterns_is_config_error() {
        let err = PatternRegistry::from_yaml_str(
            r#"
patterns:
  - name: "Broken"
    regex: '(('
  - name: ""
    regex: 'abc'
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ScanError::Config(_)));
    }

    #[test]
    fn test_malformed_source_is_config_error() {
        let err = PatternRegistry::from_yaml_str("patterns: [ {name: ").unwrap_err();
        assert!(matches!(err, ScanError::Config(_)));
    }

    #[test]
    fn test_duplicate_names_merge() {
        let registry = PatternRegistry::from_toml_str(
            r#"
[[patterns]]
name = "Endpoint"
regex = "https://api\\.example\\.com"

[[patterns]]
name = "Endpoint"
regex = "https://auth\\.example\\.com"
"#,
        )
        .unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("Endpoint").unwrap().regexes.len(), 2);
    }

    #[test]
    fn test_single_regex_takes_precedence() {
        let def = PatternDef {
            name: "x".into(),
            regex: Some("a".into()),
            regexes: vec!["b".into()],
            confidence: Confidence::Low,
        };
        assert_eq!(def.source_regexes(), vec!["a"]);
    }
}
