//! Package download collaborator

use super::{is_package_file, run_tool};
use crate::error::{Result, ScanError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info};

/// Google Play account used by apkeep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GooglePlayCredentials {
    pub email: String,
    pub aas_token: Option<String>,
    pub oauth_token: Option<String>,
    #[serde(default)]
    pub accept_tos: bool,
}

/// What to fetch and from where
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub package_name: String,
    pub version: Option<String>,
    /// Download source understood by the downloader, e.g. `apk-pure`
    pub source: String,
    #[serde(default, skip_serializing)]
    pub credentials: Option<GooglePlayCredentials>,
}

impl DownloadRequest {
    pub fn new(package_name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            package_name: package_name.into(),
            version: None,
            source: source.into(),
            credentials: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into()).filter(|v: &String| !v.is_empty());
        self
    }

    pub fn with_credentials(mut self, credentials: GooglePlayCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// `name` or `name@version`
    pub fn app_spec(&self) -> String {
        match self.version.as_deref() {
            Some(version) => format!("{}@{}", self.package_name, version),
            None => self.package_name.clone(),
        }
    }
}

/// Fetches a package by name
#[async_trait]
pub trait PackageDownloader: Send + Sync {
    /// Download into `out_dir` and return the downloaded file
    async fn download(&self, request: &DownloadRequest, out_dir: &Path) -> Result<PathBuf>;
}

/// apkeep process wrapper
pub struct Apkeep {
    program: PathBuf,
}

impl Apkeep {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn args(&self, request: &DownloadRequest, out_dir: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-a".into(), request.app_spec().into()];

        if !request.source.is_empty() {
            args.push("-d".into());
            args.push(request.source.clone().into());
        }

        if request.source == "google-play" {
            if let Some(ref creds) = request.credentials {
                args.push("-e".into());
                args.push(creds.email.clone().into());
                if let Some(ref token) = creds.aas_token {
                    args.push("-t".into());
                    args.push(token.clone().into());
                }
                if let Some(ref token) = creds.oauth_token {
                    args.push("--oauth-token".into());
                    args.push(token.clone().into());
                }
                if creds.accept_tos {
                    args.push("--accept-tos".into());
                }
            }
        }

        args.extend(["-s", "1000", "-r", "1"].map(OsString::from));
        args.push(out_dir.as_os_str().to_owned());
        args
    }
}

impl Default for Apkeep {
    fn default() -> Self {
        Self::new("apkeep")
    }
}

#[async_trait]
impl PackageDownloader for Apkeep {
    async fn download(&self, request: &DownloadRequest, out_dir: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(out_dir).await?;
        info!("Downloading {} from {}", request.app_spec(), request.source);

        let status = run_tool(&self.program, &self.args(request, out_dir)).await?;
        if !status.success {
            return Err(ScanError::Download(format!(
                "apkeep failed for {}: {}",
                request.package_name,
                status.summary()
            )));
        }

        find_downloaded_package(out_dir, &request.package_name)?.ok_or_else(|| {
            ScanError::Download(format!(
                "no downloaded package found for {} in {}",
                request.package_name,
                out_dir.display()
            ))
        })
    }
}

/// Most recently modified package file in `dir` whose name mentions `package_name`
pub fn find_downloaded_package(dir: &Path, package_name: &str) -> Result<Option<PathBuf>> {
    let underscored = package_name.replace('.', "_");
    let mut newest: Option<(SystemTime, PathBuf)> = None;

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type()?.is_file() || !is_package_file(&path) {
            continue;
        }

        let file_name = entry.file_name().to_string_lossy().into_owned();
        if !file_name.contains(package_name) && !file_name.contains(&underscored) {
            continue;
        }

        let modified = entry.metadata()?.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        debug!("Download candidate: {}", file_name);
        if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
            newest = Some((modified, path));
        }
    }

    Ok(newest.map(|(_, path)| path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arg_strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_apkeep_arguments() {
        let request = DownloadRequest::new("com.example.app", "apk-pure").with_version("1.2.3");
        let args = arg_strings(Apkeep::default().args(&request, Path::new("/tmp/dl")));
        assert_eq!(
            args,
            vec![
                "-a",
                "com.example.app@1.2.3",
                "-d",
                "apk-pure",
                "-s",
                "1000",
                "-r",
                "1",
                "/tmp/dl"
            ]
        );
    }

    #[test]
    fn test_google_play_credentials() {
        let request = DownloadRequest::new("com.example.app", "google-play").with_credentials(
            GooglePlayCredentials {
                email: "user@example.com".into(),
                aas_token: Some("aas".into()),
                oauth_token: None,
                accept_tos: true,
            },
        );
        let args = arg_strings(Apkeep::default().args(&request, Path::new("/tmp/dl")));
        assert!(args.windows(2).any(|w| w == ["-e", "user@example.com"]));
        assert!(args.windows(2).any(|w| w == ["-t", "aas"]));
        assert!(args.contains(&"--accept-tos".to_string()));
        assert!(!args.contains(&"--oauth-token".to_string()));
    }

    #[test]
    fn test_empty_version_is_ignored() {
        let request = DownloadRequest::new("com.example.app", "apk-pure").with_version("");
        assert_eq!(request.app_spec(), "com.example.app");
    }

    #[test]
    fn test_find_downloaded_package() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("other.apk"), b"x").unwrap();
        std::fs::write(dir.path().join("com_example_app.xapk"), b"x").unwrap();
        std::fs::write(dir.path().join("com.example.app.txt"), b"x").unwrap();

        let found = find_downloaded_package(dir.path(), "com.example.app").unwrap().unwrap();
        assert_eq!(found.file_name().unwrap(), "com_example_app.xapk");
        assert!(find_downloaded_package(dir.path(), "org.none").unwrap().is_none());
    }
}
