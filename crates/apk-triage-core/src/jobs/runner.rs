//! Runs the pipeline for a job on its own task

use super::{JobManager, JobStatus, JobSubject};
use crate::error::{Result, ScanError};
use crate::report::{write_meta, write_reports, Report, ReportMeta};
use crate::tools::{Apkeep, ApkMitm, DownloadRequest, PackageDownloader, TrafficPatcher};
use crate::Scanner;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, warn};

/// Per-job pipeline options
#[derive(Debug, Clone, Default)]
pub struct JobOptions {
    /// Produce a traffic-interception build next to the report
    pub traffic_patch: bool,
    /// Overrides the scanner's configured webhook
    pub webhook_url: Option<String>,
}

/// A submitted job
pub struct JobHandle {
    pub id: String,
    task: JoinHandle<()>,
}

impl JobHandle {
    /// Wait until the job reaches a terminal status
    pub async fn wait(self) {
        if let Err(e) = self.task.await {
            error!("Job {} supervisor task failed: {}", self.id, e);
        }
    }
}

enum JobInput {
    Local(PathBuf),
    Download(DownloadRequest),
}

/// Shared state every pipeline task needs
#[derive(Clone)]
struct Pipeline {
    manager: Arc<JobManager>,
    scanner: Arc<Scanner>,
    downloader: Arc<dyn PackageDownloader>,
    patcher: Arc<dyn TrafficPatcher>,
    reports_root: PathBuf,
    download_dir: PathBuf,
}

/// Submits pipeline runs as jobs
pub struct JobRunner {
    pipeline: Pipeline,
}

impl JobRunner {
    /// Create a runner using apkeep and apk-mitm from the scanner's tool config
    pub fn new(
        manager: Arc<JobManager>,
        scanner: Arc<Scanner>,
        reports_root: PathBuf,
        download_dir: PathBuf,
    ) -> Self {
        let tools = &scanner.config().tools;
        let downloader: Arc<dyn PackageDownloader> = Arc::new(Apkeep::new(tools.apkeep.clone()));
        let patcher: Arc<dyn TrafficPatcher> = Arc::new(ApkMitm::new(tools.apk_mitm.clone()));

        Self {
            pipeline: Pipeline {
                manager,
                scanner,
                downloader,
                patcher,
                reports_root,
                download_dir,
            },
        }
    }

    pub fn with_downloader(mut self, downloader: Arc<dyn PackageDownloader>) -> Self {
        self.pipeline.downloader = downloader;
        self
    }

    pub fn with_patcher(mut self, patcher: Arc<dyn TrafficPatcher>) -> Self {
        self.pipeline.patcher = patcher;
        self
    }

    pub fn manager(&self) -> &Arc<JobManager> {
        &self.pipeline.manager
    }

    /// Analyze a package already on disk
    pub fn submit_local(&self, package: PathBuf, options: JobOptions) -> JobHandle {
        let subject = JobSubject {
            package_name: package
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            version: None,
            source: "upload".to_string(),
        };
        self.submit(subject, JobInput::Local(package), options)
    }

    /// Download a package, then analyze it
    pub fn submit_download(&self, request: DownloadRequest, options: JobOptions) -> JobHandle {
        let subject = JobSubject {
            package_name: request.package_name.clone(),
            version: request.version.clone(),
            source: request.source.clone(),
        };
        self.submit(subject, JobInput::Download(request), options)
    }

    fn submit(&self, subject: JobSubject, input: JobInput, options: JobOptions) -> JobHandle {
        let id = self.pipeline.manager.create(subject);
        let pipeline = self.pipeline.clone();
        let job_id = id.clone();

        let task = tokio::spawn(async move {
            let worker = tokio::spawn(pipeline.clone().run(job_id.clone(), input, options));
            let outcome = worker.await;
            pipeline.finish(&job_id, outcome);
        });

        JobHandle { id, task }
    }
}

impl Pipeline {
    async fn run(self, id: String, input: JobInput, options: JobOptions) -> Result<String> {
        let package = match input {
            JobInput::Local(path) => {
                self.manager
                    .update_status(&id, JobStatus::Analyzing, "Starting analysis...")?;
                path
            }
            JobInput::Download(request) => {
                self.manager
                    .update_status(&id, JobStatus::Downloading, "Starting download...")?;
                info!("Job {}: downloading {} from {}", id, request.package_name, request.source);
                let path = self.downloader.download(&request, &self.download_dir).await?;
                info!("Job {}: package downloaded to {}", id, path.display());
                self.manager
                    .update_status(&id, JobStatus::Analyzing, "Starting analysis...")?;
                path
            }
        };

        let report_id = new_report_id();
        let out_dir = self.reports_root.join(&report_id);
        match self.produce(&id, &package, &out_dir, &options).await {
            Ok(report) => {
                info!(
                    "Job {}: {} findings, report {}",
                    id,
                    report.total_findings(),
                    report_id
                );
                Ok(report_id)
            }
            Err(e) => {
                // A failed job leaves nothing in the report store
                if let Err(cleanup) = tokio::fs::remove_dir_all(&out_dir).await {
                    if cleanup.kind() != std::io::ErrorKind::NotFound {
                        warn!("Could not remove {}: {}", out_dir.display(), cleanup);
                    }
                }
                Err(e)
            }
        }
    }

    /// Patch, scan and export into `out_dir`
    async fn produce(
        &self,
        id: &str,
        package: &Path,
        out_dir: &Path,
        options: &JobOptions,
    ) -> Result<Report> {
        tokio::fs::create_dir_all(out_dir).await.map_err(|e| {
            ScanError::Export(format!("failed to create report directory: {}", e))
        })?;

        let mut patched = None;
        if options.traffic_patch {
            self.manager
                .update_status(id, JobStatus::Analyzing, "Applying traffic patch...")?;
            patched = Some(self.patcher.patch(package, out_dir).await?);
            self.manager.update_status(
                id,
                JobStatus::Analyzing,
                "Traffic patch applied, starting analysis...",
            )?;
        }
        let meta = ReportMeta {
            original_package: file_name(package),
            traffic_patch: options.traffic_patch,
            patched_package: patched.as_deref().map(file_name),
        };
        write_meta(&meta, out_dir).await?;

        self.manager
            .update_status(id, JobStatus::Analyzing, "Decompiling and scanning...")?;
        let report = self.scanner.scan_package(package).await?;

        self.manager
            .update_status(id, JobStatus::Analyzing, "Writing reports...")?;
        let paths = write_reports(&report, out_dir).await?;

        let webhook = options
            .webhook_url
            .as_deref()
            .or(self.scanner.config().webhook_url.as_deref());
        if let Some(url) = webhook {
            self.scanner.notify(url, &report, &paths).await;
        }
        Ok(report)
    }

    /// Record the pipeline outcome as the job's terminal status
    fn finish(&self, id: &str, outcome: std::result::Result<Result<String>, JoinError>) {
        let recorded = match outcome {
            Ok(Ok(report_id)) => self
                .manager
                .set_report_id(id, &report_id)
                .and_then(|_| {
                    self.manager
                        .update_status(id, JobStatus::Completed, "Analysis complete")
                }),
            Ok(Err(e)) => {
                warn!("Job {} failed: {}", id, e);
                self.manager.set_error(id, e.to_string())
            }
            Err(e) => {
                let cause = panic_cause(e);
                error!("Job {} aborted: {}", id, cause);
                self.manager.set_error(id, cause)
            }
        };

        if let Err(e) = recorded {
            warn!("Could not record outcome of job {}: {}", id, e);
        }
    }
}

fn panic_cause(e: JoinError) -> String {
    if !e.is_panic() {
        return format!("pipeline task cancelled: {}", e);
    }
    let payload = e.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("panic: {}", message)
}

/// `YYYYmmdd-HHMMSS-<8 hex>`
fn new_report_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().format("%Y%m%d-%H%M%S"), &suffix[..8])
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
