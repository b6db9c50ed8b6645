//! Wrappers around the external command-line tools the pipeline drives

mod decompiler;
mod downloader;
mod patcher;

pub use decompiler::{Decompiler, Jadx, JADX_DEFAULT_ARGS};
pub use downloader::{
    find_downloaded_package, Apkeep, DownloadRequest, GooglePlayCredentials, PackageDownloader,
};
pub use patcher::{ApkMitm, TrafficPatcher};

use crate::error::{Result, ScanError};
use std::ffi::OsString;
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

/// Exit status and captured output of a tool run
#[derive(Debug, Clone, Default)]
pub struct ToolStatus {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolStatus {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            code: Some(0),
            ..Default::default()
        }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            code: Some(1),
            stderr: stderr.into(),
            ..Default::default()
        }
    }

    /// Last non-empty stderr line, for error messages
    pub fn summary(&self) -> String {
        self.stderr
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .map(|l| l.trim().to_string())
            .unwrap_or_else(|| match self.code {
                Some(code) => format!("exit code {}", code),
                None => "terminated by signal".to_string(),
            })
    }
}

/// Run a tool to completion, capturing its output.
///
/// Failing to start the process is an error; a non-zero exit is reported in
/// the returned status.
pub(crate) async fn run_tool(program: &Path, args: &[OsString]) -> Result<ToolStatus> {
    let name = program.display().to_string();
    debug!("Running {} with {} arguments", name, args.len());

    let output = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| ScanError::tool(&name, format!("could not start: {}", e)))?;

    let status = ToolStatus {
        success: output.status.success(),
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };
    debug!("{} exited with {:?}", name, status.code);
    Ok(status)
}

/// Whether a file name carries a package extension
pub(crate) fn is_package_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()),
        Some(ref ext) if ext == "apk" || ext == "xapk"
    )
}
