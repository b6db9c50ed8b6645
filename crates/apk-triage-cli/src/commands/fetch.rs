//! Fetch command - download a package and run it through a job

use anyhow::{Context, Result};
use apk_triage_core::jobs::{JobManager, JobOptions, JobRunner, JobStatus};
use apk_triage_core::tools::{DownloadRequest, GooglePlayCredentials};
use apk_triage_core::{ScanConfig, Scanner};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::banner;

pub struct FetchArgs {
    pub package: String,
    pub version: Option<String>,
    pub source: String,
    pub reports_root: PathBuf,
    pub traffic_patch: bool,
    pub webhook: Option<String>,
    pub email: Option<String>,
    pub aas_token: Option<String>,
}

/// Run the fetch command
pub async fn run(config: ScanConfig, args: FetchArgs) -> Result<()> {
    let scanner = Arc::new(Scanner::new(config).context("Failed to create scanner")?);
    let manager = Arc::new(JobManager::new());
    let download_dir = args.reports_root.join("downloads");
    let runner = JobRunner::new(
        Arc::clone(&manager),
        scanner,
        args.reports_root.clone(),
        download_dir,
    );

    let mut request = DownloadRequest::new(&args.package, &args.source);
    if let Some(version) = args.version {
        request = request.with_version(version);
    }
    if let Some(email) = args.email {
        request = request.with_credentials(GooglePlayCredentials {
            email,
            aas_token: args.aas_token,
            oauth_token: None,
            accept_tos: true,
        });
    }

    banner::print_header("Fetch");
    println!("{} {}", "Package:".cyan().bold(), request.app_spec().white().bold());
    banner::print_divider();

    let options = JobOptions {
        traffic_patch: args.traffic_patch,
        webhook_url: args.webhook,
    };
    let handle = runner.submit_download(request, options);
    let id = handle.id.clone();

    // Echo progress until the job settles
    let mut last_progress = String::new();
    loop {
        let Some(job) = manager.get(&id) else { break };
        if job.progress != last_progress {
            println!("{} {}", format!("[{}]", job.status).dimmed(), job.progress);
            last_progress = job.progress;
        }
        if job.status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
    handle.wait().await;

    let job = manager
        .get(&id)
        .with_context(|| format!("job {} disappeared", id))?;
    banner::print_divider();
    match job.status {
        JobStatus::Completed => {
            let report_id = job.report_id.unwrap_or_default();
            println!(
                "{} Report written to {}",
                banner::status_ok(),
                args.reports_root.join(report_id).display()
            );
            Ok(())
        }
        _ => {
            let cause = job.error.unwrap_or_else(|| "unknown error".to_string());
            println!("{} {}", banner::status_fail(), cause);
            anyhow::bail!("job {} failed", id)
        }
    }
}
