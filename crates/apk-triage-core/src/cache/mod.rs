//! Content-addressed cache of decompiled package trees

use crate::error::{Result, ScanError};
use crate::tools::Decompiler;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Subdirectory jadx always creates for decompiled classes
const SOURCES_DIR: &str = "sources";

/// Manifest locations, most specific first
const MANIFEST_CANDIDATES: &[&str] = &["resources/AndroidManifest.xml", "AndroidManifest.xml"];

/// Present in entries published from a decompile that reported failure
const PARTIAL_MARKER: &str = ".partial";

/// A decompiled package tree, read-only for consumers
#[derive(Debug, Clone)]
pub struct DecompiledTree {
    pub root: PathBuf,
    pub content_hash: String,
    /// Served from an existing cache entry
    pub cache_hit: bool,
    /// Decompiler reported failure but left usable output
    pub partial: bool,
}

impl DecompiledTree {
    /// Wrap an existing directory, e.g. for tests or pre-decompiled input
    pub fn from_dir(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            content_hash: String::new(),
            cache_hit: false,
            partial: false,
        }
    }

    /// First manifest candidate that exists in the tree
    pub fn manifest_path(&self) -> Option<PathBuf> {
        MANIFEST_CANDIDATES
            .iter()
            .map(|rel| self.root.join(rel))
            .find(|p| p.is_file())
    }

    /// Path relative to the tree root, with forward slashes
    pub fn relative(&self, path: &Path) -> String {
        crate::scan::relative_display(&self.root, path)
    }
}

/// Hex blake3 digest of a file's contents
pub fn content_hash(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize().to_hex().to_string())
}

/// Maps package content hashes to decompiled directories
pub struct DecompilationCache {
    root: PathBuf,
    scratch_root: Option<PathBuf>,
    decompiler: Arc<dyn Decompiler>,
}

impl DecompilationCache {
    /// Create a cache rooted at `root`
    pub fn new(root: PathBuf, decompiler: Arc<dyn Decompiler>) -> Result<Self> {
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            scratch_root: None,
            decompiler,
        })
    }

    /// Decompile into `scratch` instead of the system temp dir
    pub fn with_scratch_dir(mut self, scratch: PathBuf) -> Self {
        self.scratch_root = Some(scratch);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Canonical directory for a content hash
    pub fn entry_path(&self, hash: &str) -> PathBuf {
        self.root.join(hash)
    }

    /// Decompiled tree for `package`, decompiling only on a miss
    pub async fn resolve(&self, package: &Path) -> Result<DecompiledTree> {
        let owned = package.to_path_buf();
        let hash = tokio::task::spawn_blocking(move || content_hash(&owned))
            .await
            .map_err(|e| ScanError::Internal(format!("hashing task failed: {}", e)))??;

        let entry = self.entry_path(&hash);
        if entry.is_dir() {
            info!("Using cached decompilation for {}", package.display());
            let partial = entry.join(PARTIAL_MARKER).is_file();
            return Ok(DecompiledTree {
                root: entry,
                content_hash: hash,
                cache_hit: true,
                partial,
            });
        }

        debug!("Cache miss for {} ({})", package.display(), hash);
        let scratch = self.scratch_dir()?;
        let output = scratch.path().join("out");

        let status = self
            .decompiler
            .decompile(package, &output)
            .await
            .map_err(|e| ScanError::Decompile(e.to_string()))?;
        let partial = !status.success;
        if partial {
            if output.join(SOURCES_DIR).is_dir() {
                warn!(
                    "{} reported failure for {} but produced output, using partial tree: {}",
                    self.decompiler.name(),
                    package.display(),
                    status.summary()
                );
                std::fs::write(output.join(PARTIAL_MARKER), status.summary())?;
            } else {
                return Err(ScanError::Decompile(format!(
                    "{} failed for {}: {}",
                    self.decompiler.name(),
                    package.display(),
                    status.summary()
                )));
            }
        } else if !output.is_dir() {
            return Err(ScanError::Decompile(format!(
                "{} produced no output for {}",
                self.decompiler.name(),
                package.display()
            )));
        }

        let root = self.root.clone();
        let published_hash = hash.clone();
        let root = tokio::task::spawn_blocking(move || publish(&root, &published_hash, &output))
            .await
            .map_err(|e| ScanError::Internal(format!("publish task failed: {}", e)))??;
        drop(scratch);

        Ok(DecompiledTree {
            root,
            content_hash: hash,
            cache_hit: false,
            partial,
        })
    }

    /// Content hashes currently cached
    pub fn entries(&self) -> Result<Vec<String>> {
        let mut hashes = Vec::new();
        if !self.root.exists() {
            return Ok(hashes);
        }
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type()?.is_dir()
                && !name.starts_with('.')
                && name.chars().all(|c| c.is_ascii_hexdigit())
            {
                hashes.push(name);
            }
        }
        hashes.sort();
        Ok(hashes)
    }

    /// Remove every published entry, returning how many were removed.
    ///
    /// Staging directories belong to in-progress publishes and are left alone.
    pub fn clear(&self) -> Result<usize> {
        let hashes = self.entries()?;
        for hash in &hashes {
            std::fs::remove_dir_all(self.entry_path(hash))?;
        }
        let removed = hashes.len();
        info!("Cleared {} cache entries from {}", removed, self.root.display());
        Ok(removed)
    }

    fn scratch_dir(&self) -> Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("apk-triage-");
        let dir = match self.scratch_root {
            Some(ref scratch) => {
                std::fs::create_dir_all(scratch)?;
                builder.tempdir_in(scratch)?
            }
            None => builder.tempdir()?,
        };
        Ok(dir)
    }
}

/// Move `output` into `<root>/<hash>`.
///
/// Rename first; when that fails the tree is copied into a hidden staging
/// directory under `root` and renamed into place, so the canonical path only
/// ever holds a complete tree.
fn publish(root: &Path, hash: &str, output: &Path) -> Result<PathBuf> {
    publish_with(root, hash, output, |from, to| std::fs::rename(from, to))
}

fn publish_with<R>(root: &Path, hash: &str, output: &Path, rename: R) -> Result<PathBuf>
where
    R: Fn(&Path, &Path) -> io::Result<()>,
{
    let entry = root.join(hash);
    if entry.is_dir() {
        debug!("Entry {} appeared during decompilation, discarding ours", hash);
        return Ok(entry);
    }

    match rename(output, &entry) {
        Ok(()) => {
            debug!("Published {} by rename", hash);
            return Ok(entry);
        }
        Err(e) if entry.is_dir() => {
            debug!("Lost publish race for {}: {}", hash, e);
            return Ok(entry);
        }
        Err(e) => debug!("Rename into cache failed ({}), copying instead", e),
    }

    let staging = root.join(format!(".staging-{}-{}", hash, uuid::Uuid::new_v4()));
    if let Err(e) = copy_tree(output, &staging) {
        let _ = std::fs::remove_dir_all(&staging);
        return Err(e);
    }

    match rename(&staging, &entry) {
        Ok(()) => Ok(entry),
        Err(_) if entry.is_dir() => {
            let _ = std::fs::remove_dir_all(&staging);
            Ok(entry)
        }
        Err(e) => {
            let _ = std::fs::remove_dir_all(&staging);
            Err(e.into())
        }
    }
}

fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    for entry in WalkDir::new(from).follow_links(false) {
        let entry = entry.map_err(|e| ScanError::Io(io::Error::new(io::ErrorKind::Other, e)))?;
        let relative = entry.path().strip_prefix(from).unwrap_or(entry.path());
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolStatus;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Writes a small tree and counts invocations
    struct FakeDecompiler {
        calls: AtomicUsize,
        succeed: bool,
        write_sources: bool,
    }

    impl FakeDecompiler {
        fn new(succeed: bool, write_sources: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                succeed,
                write_sources,
            })
        }
    }

    #[async_trait]
    impl Decompiler for FakeDecompiler {
        async fn decompile(&self, _package: &Path, output_dir: &Path) -> Result<ToolStatus> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.write_sources {
                let dir = output_dir.join("sources/com/example");
                std::fs::create_dir_all(&dir)?;
                std::fs::write(dir.join("Main.java"), "class Main {}")?;
            }
            Ok(if self.succeed {
                ToolStatus::succeeded()
            } else {
                ToolStatus::failed("ERROR: finished with errors")
            })
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    fn package(dir: &Path, bytes: &[u8]) -> PathBuf {
        let path = dir.join("app.apk");
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[tokio::test]
    async fn test_resolve_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeDecompiler::new(true, true);
        let cache = DecompilationCache::new(dir.path().join("cache"), fake.clone())
            .unwrap()
            .with_scratch_dir(dir.path().join("scratch"));
        let apk = package(dir.path(), b"PK\x03\x04 package bytes");

        let first = cache.resolve(&apk).await.unwrap();
        let second = cache.resolve(&apk).await.unwrap();
        let third = cache.resolve(&apk).await.unwrap();

        assert_eq!(fake.calls.load(Ordering::SeqCst), 1);
        assert!(!first.cache_hit);
        assert!(second.cache_hit && third.cache_hit);
        assert_eq!(first.root, second.root);
        assert_eq!(first.root, cache.entry_path(&content_hash(&apk).unwrap()));
        assert!(first.root.join("sources/com/example/Main.java").is_file());
        assert_eq!(cache.entries().unwrap(), vec![first.content_hash.clone()]);
    }

    #[tokio::test]
    async fn test_partial_output_is_published() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeDecompiler::new(false, true);
        let cache = DecompilationCache::new(dir.path().join("cache"), fake.clone()).unwrap();
        let apk = package(dir.path(), b"partial");

        let tree = cache.resolve(&apk).await.unwrap();
        assert!(tree.partial);
        assert!(!tree.cache_hit);
        assert!(tree.root.join("sources").is_dir());

        // A later scan of the same bytes still knows the tree is incomplete
        let again = cache.resolve(&apk).await.unwrap();
        assert!(again.cache_hit);
        assert!(again.partial);
        assert_eq!(fake.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_complete_entry_is_not_partial_on_hit() {
        let dir = tempfile::tempdir().unwrap();
        let cache =
            DecompilationCache::new(dir.path().join("cache"), FakeDecompiler::new(true, true))
                .unwrap();
        let apk = package(dir.path(), b"complete");

        cache.resolve(&apk).await.unwrap();
        let hit = cache.resolve(&apk).await.unwrap();
        assert!(hit.cache_hit);
        assert!(!hit.partial);
        assert!(!hit.root.join(PARTIAL_MARKER).exists());
    }

    struct UnlaunchableDecompiler;

    #[async_trait]
    impl Decompiler for UnlaunchableDecompiler {
        async fn decompile(&self, _package: &Path, _output_dir: &Path) -> Result<ToolStatus> {
            Err(ScanError::tool("jadx", "could not start: No such file or directory"))
        }

        fn name(&self) -> &str {
            "jadx"
        }
    }

    #[tokio::test]
    async fn test_unlaunchable_decompiler_is_decompile_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache =
            DecompilationCache::new(dir.path().join("cache"), Arc::new(UnlaunchableDecompiler))
                .unwrap();
        let apk = package(dir.path(), b"no jadx");

        let err = cache.resolve(&apk).await.unwrap_err();
        assert!(matches!(err, ScanError::Decompile(ref msg) if msg.contains("could not start")));
    }

    #[tokio::test]
    async fn test_failure_without_output_is_decompile_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache =
            DecompilationCache::new(dir.path().join("cache"), FakeDecompiler::new(false, false))
                .unwrap();
        let apk = package(dir.path(), b"broken");

        let err = cache.resolve(&apk).await.unwrap_err();
        assert!(matches!(err, ScanError::Decompile(_)));
        assert!(cache.entries().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_existing_entry_is_trusted() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeDecompiler::new(true, true);
        let cache = DecompilationCache::new(dir.path().join("cache"), fake.clone()).unwrap();
        let apk = package(dir.path(), b"already there");

        std::fs::create_dir_all(cache.entry_path(&content_hash(&apk).unwrap())).unwrap();
        let tree = cache.resolve(&apk).await.unwrap();
        assert!(tree.cache_hit);
        assert_eq!(fake.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_publish_keeps_first_entry() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("cache");
        std::fs::create_dir_all(root.join("abc")).unwrap();
        std::fs::write(root.join("abc/winner.txt"), "first").unwrap();

        let output = dir.path().join("out");
        std::fs::create_dir_all(&output).unwrap();
        std::fs::write(output.join("loser.txt"), "second").unwrap();

        let entry = publish(&root, "abc", &output).unwrap();
        assert!(entry.join("winner.txt").is_file());
        assert!(!entry.join("loser.txt").exists());
    }

    #[test]
    fn test_publish_falls_back_to_staging_copy() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("cache");
        std::fs::create_dir_all(&root).unwrap();

        let output = dir.path().join("out");
        std::fs::create_dir_all(output.join("sources/com/example")).unwrap();
        std::fs::write(output.join("sources/com/example/Main.java"), "class Main {}").unwrap();

        // Renaming the scratch output fails as it would across devices
        let scratch = output.clone();
        let entry = publish_with(&root, "abc", &output, |from, to| {
            if from == scratch.as_path() {
                Err(io::Error::new(io::ErrorKind::Other, "cross-device link"))
            } else {
                std::fs::rename(from, to)
            }
        })
        .unwrap();

        assert_eq!(entry, root.join("abc"));
        assert!(entry.join("sources/com/example/Main.java").is_file());
        let names: Vec<String> = std::fs::read_dir(&root)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["abc".to_string()]);
    }

    #[test]
    fn test_failed_staging_rename_leaves_no_staging_dir() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("cache");
        std::fs::create_dir_all(&root).unwrap();
        let output = dir.path().join("out");
        std::fs::create_dir_all(&output).unwrap();
        std::fs::write(output.join("a.txt"), "a").unwrap();

        let err = publish_with(&root, "abc", &output, |_, _| {
            Err(io::Error::new(io::ErrorKind::Other, "read-only"))
        })
        .unwrap_err();
        assert!(matches!(err, ScanError::Io(_)));
        assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0);
    }

    #[test]
    fn test_copy_tree() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("from");
        std::fs::create_dir_all(from.join("a/b")).unwrap();
        std::fs::write(from.join("a/b/c.txt"), "c").unwrap();

        let to = dir.path().join("to");
        copy_tree(&from, &to).unwrap();
        assert_eq!(std::fs::read_to_string(to.join("a/b/c.txt")).unwrap(), "c");
    }

    #[test]
    fn test_clear_and_manifest_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let cache =
            DecompilationCache::new(dir.path().to_path_buf(), FakeDecompiler::new(true, true))
                .unwrap();
        let entry = cache.entry_path("00ff");
        std::fs::create_dir_all(entry.join("resources")).unwrap();
        std::fs::write(entry.join("AndroidManifest.xml"), "<manifest/>").unwrap();

        let tree = DecompiledTree::from_dir(&entry);
        assert_eq!(tree.manifest_path(), Some(entry.join("AndroidManifest.xml")));
        std::fs::write(entry.join("resources/AndroidManifest.xml"), "<manifest/>").unwrap();
        assert_eq!(tree.manifest_path(), Some(entry.join("resources/AndroidManifest.xml")));

        // Another process is still filling this one
        let staging = dir.path().join(".staging-00ff-1");
        std::fs::create_dir_all(&staging).unwrap();

        assert_eq!(cache.clear().unwrap(), 1);
        assert!(cache.entries().unwrap().is_empty());
        assert!(staging.is_dir());
    }
}
