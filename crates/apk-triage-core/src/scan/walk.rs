//! Decompiled tree enumeration

use std::path::{Path, PathBuf};
use tracing::{debug, trace};
use walkdir::WalkDir;

/// Subtrees holding generated resources or bundled third-party code
const SKIP_PATHS: &[&str] = &[
    "/res/anim/",
    "/res/color/",
    "/res/drawable/",
    "/res/layout/",
    "/res/menu/",
    "/res/mipmap/",
    "/res/xml/",
    "/resources/",
    "/META-INF/",
    "/kotlin/",
    "/okhttp3/",
    "/okio/",
];

/// Text-bearing formats worth scanning
const RELEVANT_EXTENSIONS: &[&str] = &[
    "java",
    "kt",
    "xml",
    "txt",
    "json",
    "yaml",
    "yml",
    "properties",
    "conf",
    "config",
    "plist",
    "db",
    "sql",
    "env",
    "ini",
    "html",
    "js",
    "php",
    "py",
];

/// Check whether a path (relative to the tree root) should be scanned
pub fn is_relevant_file(relative: &Path) -> bool {
    let normalized = format!("/{}", relative.to_string_lossy().replace('\\', "/"));
    if SKIP_PATHS.iter().any(|skip| normalized.contains(skip)) {
        return false;
    }

    relative
        .extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            RELEVANT_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Collect every relevant file under `root`
pub fn collect_relevant_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut skipped = 0usize;

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                trace!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        if is_relevant_file(relative) {
            files.push(entry.into_path());
        } else {
            skipped += 1;
        }
    }

    debug!(
        root = %root.display(),
        file_count = files.len(),
        skipped,
        "Tree enumeration completed"
    );
    files
}

/// Number of files the scan engine would read under `root`
pub fn count_relevant_files(root: &Path) -> usize {
    collect_relevant_files(root).len()
}

/// Path relative to the tree root, with forward slashes
pub fn relative_display(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}
