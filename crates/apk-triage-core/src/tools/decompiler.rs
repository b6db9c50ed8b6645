//! Decompiler collaborator

use super::{run_tool, ToolStatus};
use crate::error::Result;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::info;

/// Flags passed to jadx before any configured extras
pub const JADX_DEFAULT_ARGS: &[&str] = &[
    "--no-debug-info",
    "--no-inline-methods",
    "--no-replace-consts",
    "--escape-unicode",
    "--deobf",
    "--show-bad-code",
];

/// Turns a package into a source-like directory tree
#[async_trait]
pub trait Decompiler: Send + Sync {
    /// Decompile `package` into `output_dir`.
    ///
    /// A failed status may still leave usable partial output behind.
    async fn decompile(&self, package: &Path, output_dir: &Path) -> Result<ToolStatus>;

    fn name(&self) -> &str;
}

/// jadx process wrapper
pub struct Jadx {
    program: PathBuf,
    extra_args: Vec<String>,
}

impl Jadx {
    pub fn new(program: impl Into<PathBuf>, extra_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            extra_args,
        }
    }

    fn args(&self, package: &Path, output_dir: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            package.as_os_str().to_owned(),
            "-d".into(),
            output_dir.as_os_str().to_owned(),
        ];
        args.extend(JADX_DEFAULT_ARGS.iter().map(OsString::from));
        args.extend(self.extra_args.iter().map(OsString::from));
        args
    }
}

impl Default for Jadx {
    fn default() -> Self {
        Self::new("jadx", Vec::new())
    }
}

#[async_trait]
impl Decompiler for Jadx {
    async fn decompile(&self, package: &Path, output_dir: &Path) -> Result<ToolStatus> {
        info!("Decompiling {} with jadx", package.display());
        run_tool(&self.program, &self.args(package, output_dir)).await
    }

    fn name(&self) -> &str {
        "jadx"
    }
}
