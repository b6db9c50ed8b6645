//! Insecure local storage analyzer

use super::{blocking, search_tree, tree_contains, VulnerabilityAnalyzer};
use crate::cache::DecompiledTree;
use crate::error::Result;
use crate::types::{AnalyzerFinding, Severity};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;

const NAME: &str = "InsecureStorageAnalyzer";

lazy_static! {
    /// Preference-store access, reported individually
    static ref PREFERENCE_PATTERNS: Vec<(&'static str, Regex)> = [
        r"SharedPreferences\.getSharedPreferences\(",
        r"getSharedPreferences\(",
        r"MODE_WORLD_READABLE",
        r"MODE_WORLD_WRITEABLE",
    ]
    .iter()
    .map(|p| (*p, Regex::new(p).unwrap()))
    .collect();

    /// Local database usage
    static ref DATABASE_REGEX: Regex = Regex::new(
        r"SQLiteDatabase\.openDatabase\(|SQLiteOpenHelper|CREATE TABLE|INSERT INTO"
    )
    .unwrap();

    /// Any sign that stored data is encrypted
    static ref ENCRYPTION_REGEX: Regex = Regex::new(r"SQLCipher|encrypt|decrypt|Cipher").unwrap();
}

/// Analyzer for plaintext preference and database storage
pub struct InsecureStorageAnalyzer;

impl InsecureStorageAnalyzer {
    /// Create a new insecure storage analyzer
    pub fn new() -> Self {
        Self
    }

    fn scan(root: &std::path::Path) -> Vec<AnalyzerFinding> {
        let mut findings = Vec::new();

        for (pattern, re) in PREFERENCE_PATTERNS.iter() {
            let matches = search_tree(root, re);
            if matches.is_empty() {
                continue;
            }
            findings.push(
                AnalyzerFinding::new(Severity::Low, "SharedPreferences Usage Detected")
                    .with_artifact(pattern.replace('\\', ""))
                    .with_description([
                        "SharedPreferences data is stored in plain text",
                        "No encryption applied to sensitive data",
                        "Data accessible to other apps with root access",
                    ])
                    .with_evidence(matches),
            );
        }

        let database_usage = search_tree(root, &DATABASE_REGEX);
        if !database_usage.is_empty() && !tree_contains(root, &ENCRYPTION_REGEX) {
            findings.push(
                AnalyzerFinding::new(Severity::Medium, "Unencrypted Database Usage")
                    .with_description([
                        "SQLite database without encryption detected",
                        "Sensitive data stored in plain text",
                        "Database files accessible with root access",
                    ])
                    .with_evidence(database_usage),
            );
        }

        findings
    }
}

impl Default for InsecureStorageAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VulnerabilityAnalyzer for InsecureStorageAnalyzer {
    fn name(&self) -> &str {
        NAME
    }

    async fn analyze(&self, tree: &DecompiledTree) -> Result<Vec<AnalyzerFinding>> {
        let root = tree.root.clone();
        blocking(NAME, move || Ok(Self::scan(&root))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(files: &[(&str, &str)]) -> (tempfile::TempDir, DecompiledTree) {
        let dir = tempfile::tempdir().unwrap();
        for (rel, content) in files {
            let path = dir.path().join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }
        let tree = DecompiledTree::from_dir(dir.path());
        (dir, tree)
    }

    #[tokio::test]
    async fn test_world_readable_preferences() {
        let (_dir, tree) = tree(&[(
            "sources/com/app/Prefs.java",
            "SharedPreferences p = ctx.getSharedPreferences(\"s\", MODE_WORLD_READABLE);",
        )]);

        let findings = InsecureStorageAnalyzer::new().analyze(&tree).await.unwrap();
        let artifacts: Vec<&str> = findings.iter().filter_map(|f| f.artifact.as_deref()).collect();
        assert_eq!(artifacts, vec!["getSharedPreferences(", "MODE_WORLD_READABLE"]);
        assert!(findings.iter().all(|f| f.severity == Severity::Low));
        assert_eq!(
            findings[0].evidence,
            vec!["sources/com/app/Prefs.java: getSharedPreferences("]
        );
    }

    #[tokio::test]
    async fn test_unencrypted_database() {
        let (_dir, tree) = tree(&[(
            "sources/com/app/Db.java",
            "class Db extends SQLiteOpenHelper { String s = \"CREATE TABLE notes (id INTEGER)\"; }",
        )]);

        let findings = InsecureStorageAnalyzer::new().analyze(&tree).await.unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Medium);
        assert_eq!(findings[0].evidence.len(), 2);
    }

    #[tokio::test]
    async fn test_encryption_signal_suppresses_database_finding() {
        let (_dir, tree) = tree(&[
            ("sources/com/app/Db.java", "class Db extends SQLiteOpenHelper {}"),
            ("sources/com/app/Crypto.java", "Cipher c = Cipher.getInstance(\"AES\");"),
        ]);

        let findings = InsecureStorageAnalyzer::new().analyze(&tree).await.unwrap();
        assert!(findings.is_empty());
    }
}
