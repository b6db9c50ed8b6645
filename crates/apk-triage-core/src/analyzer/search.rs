//! Regex search over the relevant files of a decompiled tree

use crate::scan::{collect_relevant_files, relative_display};
use regex::Regex;
use std::path::Path;

/// Every match of `re` as `path: match` lines, in walk order
pub fn search_tree(root: &Path, re: &Regex) -> Vec<String> {
    let mut lines = Vec::new();
    for path in collect_relevant_files(root) {
        let Ok(bytes) = std::fs::read(&path) else {
            continue;
        };
        let content = String::from_utf8_lossy(&bytes);
        let relative = relative_display(root, &path);
        lines.extend(
            re.find_iter(&content)
                .map(|m| format!("{}: {}", relative, m.as_str())),
        );
    }
    lines
}

/// Whether any relevant file contains a match; stops at the first
pub fn tree_contains(root: &Path, re: &Regex) -> bool {
    collect_relevant_files(root).iter().any(|path| {
        std::fs::read(path)
            .map(|bytes| re.is_match(&String::from_utf8_lossy(&bytes)))
            .unwrap_or(false)
    })
}
