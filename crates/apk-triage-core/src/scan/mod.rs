//! Concurrent pattern scan over a decompiled tree

mod walk;

pub use walk::{collect_relevant_files, count_relevant_files, is_relevant_file, relative_display};

use crate::error::{Result, ScanError};
use crate::patterns::{PatternGroup, PatternRegistry};
use crate::types::Finding;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;
use tracing::{debug, info, trace};

/// Platform boilerplate that matches URL-ish patterns but is never a secret
const FALSE_POSITIVES: &[&str] = &[
    "http://schemas.android.com/apk/res/android",
    "http://schemas.android.com/apk/res-auto",
    "http://schemas.android.com/aapt",
    "android.permission.",
    "android:name=",
    "android:label=",
    "android:value=",
    "android.intent.",
    "com.android.",
    "androidx.",
];

/// Check whether a match contains allow-listed platform boilerplate
pub fn is_common_false_positive(matched: &str) -> bool {
    FALSE_POSITIVES.iter().any(|fp| matched.contains(fp))
}

/// Findings keyed by pattern name
pub type FindingMap = BTreeMap<String, Vec<Finding>>;

/// Output of one scan
#[derive(Debug, Clone, Default)]
pub struct ScanOutput {
    pub findings: FindingMap,
    pub files_scanned: usize,
}

impl ScanOutput {
    pub fn total_findings(&self) -> usize {
        self.findings.values().map(Vec::len).sum()
    }
}

/// Pattern scan engine with a fixed worker count
#[derive(Debug, Clone)]
pub struct ScanEngine {
    workers: usize,
    context_width: usize,
}

impl ScanEngine {
    /// Create an engine; a worker count of zero is raised to one
    pub fn new(workers: usize, context_width: usize) -> Self {
        Self {
            workers: workers.max(1),
            context_width,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn context_width(&self) -> usize {
        self.context_width
    }

    /// Scan every relevant file under `root` with every pattern.
    ///
    /// Blocking; async callers should run it on a blocking thread.
    pub fn scan(&self, root: &Path, patterns: &PatternRegistry) -> Result<ScanOutput> {
        let start = Instant::now();
        let files = collect_relevant_files(root);
        info!("Analyzing {} files with {} workers", files.len(), self.workers);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("scan-worker-{}", i))
            .build()
            .map_err(|e| ScanError::Internal(format!("Failed to start scan workers: {}", e)))?;

        let accumulator: Mutex<FindingMap> = Mutex::new(BTreeMap::new());

        pool.install(|| {
            files.par_iter().for_each(|path| {
                let file_findings = self.scan_file(root, path, patterns);
                if file_findings.is_empty() {
                    return;
                }
                let mut results = accumulator
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                for (category, found) in file_findings {
                    results.entry(category).or_default().extend(found);
                }
            });
        });

        let findings = accumulator
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let output = ScanOutput {
            findings,
            files_scanned: files.len(),
        };

        info!(
            "Pattern scan complete: {} findings in {} categories ({:?})",
            output.total_findings(),
            output.findings.len(),
            start.elapsed()
        );
        Ok(output)
    }

    /// Scan one file; unreadable files yield nothing
    fn scan_file(&self, root: &Path, path: &Path, patterns: &PatternRegistry) -> FindingMap {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                trace!("Skipping unreadable file {}: {}", path.display(), e);
                return FindingMap::new();
            }
        };
        let content = String::from_utf8_lossy(&bytes);
        let relative = relative_display(root, path);

        let mut matches = FindingMap::new();
        for group in patterns.iter() {
            let found = self.match_group(&relative, &content, group);
            if !found.is_empty() {
                matches.insert(group.name.clone(), found);
            }
        }

        if !matches.is_empty() {
            debug!("{}: matches in {} categories", relative, matches.len());
        }
        matches
    }

    /// Apply every alternative of one pattern to one file's content
    pub fn match_group(&self, relative: &str, content: &str, group: &PatternGroup) -> Vec<Finding> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut findings = Vec::new();

        for re in &group.regexes {
            for m in re.find_iter(content) {
                let raw = m.as_str();
                let matched = raw.trim();
                if matched.is_empty()
                    || seen.contains(matched)
                    || is_common_false_positive(matched)
                {
                    continue;
                }

                let leading = raw.len() - raw.trim_start().len();
                let match_start = m.start() + leading;
                let match_end = match_start + matched.len();

                findings.push(Finding {
                    category: group.name.clone(),
                    file: relative.to_string(),
                    matched: matched.to_string(),
                    context: context_window(content, match_start, match_end, self.context_width),
                });
                seen.insert(matched);
            }
        }

        findings
    }
}

impl Default for ScanEngine {
    fn default() -> Self {
        Self::new(10, 100)
    }
}

/// Text from `max(0, start - width)` to `min(len, end + width)`, narrowed to
/// char boundaries, newlines collapsed to spaces and trimmed.
pub fn context_window(content: &str, start: usize, end: usize, width: usize) -> String {
    let mut from = start.saturating_sub(width).min(content.len());
    while !content.is_char_boundary(from) {
        from += 1;
    }
    let mut to = end.saturating_add(width).min(content.len());
    while !content.is_char_boundary(to) {
        to -= 1;
    }
    if from >= to {
        return String::new();
    }

    content[from..to]
        .replace("\r\n", " ")
        .replace(['\n', '\r'], " ")
        .trim()
        .to_string()
}
