//! Traffic-interception patch collaborator

use super::{is_package_file, run_tool};
use crate::error::{Result, ScanError};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::info;

/// Rewrites a package so its TLS traffic can be intercepted
#[async_trait]
pub trait TrafficPatcher: Send + Sync {
    /// Patch `package` and place the result in `dest_dir`
    async fn patch(&self, package: &Path, dest_dir: &Path) -> Result<PathBuf>;
}

/// apk-mitm process wrapper
pub struct ApkMitm {
    program: PathBuf,
}

impl ApkMitm {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for ApkMitm {
    fn default() -> Self {
        Self::new("apk-mitm")
    }
}

#[async_trait]
impl TrafficPatcher for ApkMitm {
    async fn patch(&self, package: &Path, dest_dir: &Path) -> Result<PathBuf> {
        let scratch = tempfile::Builder::new().prefix("apk-mitm-").tempdir()?;
        info!("Patching {} for traffic interception", package.display());

        let args: Vec<OsString> = vec![
            package.as_os_str().to_owned(),
            "--tmp-dir".into(),
            scratch.path().as_os_str().to_owned(),
            "--keep-tmp-dir".into(),
        ];
        let status = run_tool(&self.program, &args).await?;
        if !status.success {
            return Err(ScanError::tool("apk-mitm", status.summary()));
        }

        let patched = first_package_in(scratch.path())?.ok_or_else(|| {
            ScanError::tool("apk-mitm", "no patched package found in output directory")
        })?;

        tokio::fs::create_dir_all(dest_dir).await?;
        let dest = dest_dir.join(patched_file_name(&patched));
        tokio::fs::copy(&patched, &dest).await?;
        info!("Patched package written to {}", dest.display());
        Ok(dest)
    }
}

fn first_package_in(dir: &Path) -> Result<Option<PathBuf>> {
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_package_file(p))
        .collect();
    candidates.sort();
    Ok(candidates.into_iter().next())
}

/// `<stem>-mitm-patched.<ext>`
fn patched_file_name(path: &Path) -> String {
    let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    match path.extension() {
        Some(ext) => format!("{}-mitm-patched.{}", stem, ext.to_string_lossy()),
        None => format!("{}-mitm-patched", stem),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patched_file_name() {
        assert_eq!(patched_file_name(Path::new("/tmp/x/app.apk")), "app-mitm-patched.apk");
        assert_eq!(patched_file_name(Path::new("bundle.xapk")), "bundle-mitm-patched.xapk");
    }

    #[test]
    fn test_signature_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.apk.idsig"), b"x").unwrap();
        std::fs::write(dir.path().join("b.apk"), b"x").unwrap();
        let found = first_package_in(dir.path()).unwrap().unwrap();
        assert_eq!(found.file_name().unwrap(), "b.apk");
    }
}
