//! In-memory table of asynchronous pipeline jobs

mod runner;

pub use runner::{JobHandle, JobOptions, JobRunner};

use crate::error::JobError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Created, nothing started yet
    Pending,
    /// Fetching the package
    Downloading,
    /// Decompiling, scanning and analyzing
    Analyzing,
    /// Report produced
    Completed,
    /// Stopped with an error
    Failed,
}

impl JobStatus {
    /// States reachable from this one.
    ///
    /// ```text
    /// Pending ──► Downloading ──► Analyzing ──► Completed
    ///   │  └───────────────────────►┘  │
    ///   └──────────► Failed ◄──────────┘
    /// ```
    pub fn valid_transitions(&self) -> &[JobStatus] {
        match self {
            Self::Pending => &[Self::Downloading, Self::Analyzing, Self::Failed],
            Self::Downloading => &[Self::Analyzing, Self::Failed],
            Self::Analyzing => &[Self::Completed, Self::Failed],
            Self::Completed | Self::Failed => &[],
        }
    }

    pub fn can_transition_to(&self, target: &JobStatus) -> bool {
        self.valid_transitions().contains(target)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Downloading or analyzing
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Downloading | Self::Analyzing)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Downloading => write!(f, "downloading"),
            Self::Analyzing => write!(f, "analyzing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Package a job is about
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobSubject {
    pub package_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Download source, or `upload` for local packages
    pub source: String,
}

/// Snapshot of one job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    #[serde(flatten)]
    pub subject: JobSubject,
    pub status: JobStatus,
    pub progress: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_id: Option<String>,
    #[serde(skip)]
    seq: u64,
}

/// Owns every job record for the life of the process
#[derive(Default)]
pub struct JobManager {
    jobs: RwLock<HashMap<String, Job>>,
    next_seq: AtomicU64,
}

impl JobManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Job>> {
        self.jobs.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Job>> {
        self.jobs.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a new pending job and return its id
    pub fn create(&self, subject: JobSubject) -> String {
        let id = format!("job_{}", uuid::Uuid::new_v4().simple());
        let job = Job {
            id: id.clone(),
            subject,
            status: JobStatus::Pending,
            progress: "Job created".to_string(),
            error: None,
            created_at: Utc::now(),
            completed_at: None,
            report_id: None,
            seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
        };

        info!("Created job {} for {}", id, job.subject.package_name);
        self.write().insert(id.clone(), job);
        id
    }

    /// Move a job to `status`.
    ///
    /// Repeating the current non-terminal status only updates progress.
    pub fn update_status(
        &self,
        id: &str,
        status: JobStatus,
        progress: impl Into<String>,
    ) -> Result<(), JobError> {
        let mut jobs = self.write();
        let job = jobs.get_mut(id).ok_or_else(|| JobError::NotFound(id.to_string()))?;

        if job.status != status || job.status.is_terminal() {
            if !job.status.can_transition_to(&status) {
                return Err(JobError::InvalidTransition {
                    id: id.to_string(),
                    from: job.status.to_string(),
                    to: status.to_string(),
                });
            }
            debug!("Job {}: {} -> {}", id, job.status, status);
            job.status = status;
            if status.is_terminal() {
                job.completed_at = Some(Utc::now());
            }
        }
        job.progress = progress.into();
        Ok(())
    }

    /// Fail a job with `cause`
    pub fn set_error(&self, id: &str, cause: impl Into<String>) -> Result<(), JobError> {
        let cause = cause.into();
        let mut jobs = self.write();
        let job = jobs.get_mut(id).ok_or_else(|| JobError::NotFound(id.to_string()))?;

        if job.status.is_terminal() {
            return Err(JobError::InvalidTransition {
                id: id.to_string(),
                from: job.status.to_string(),
                to: JobStatus::Failed.to_string(),
            });
        }

        info!("Job {} failed: {}", id, cause);
        job.status = JobStatus::Failed;
        job.progress = "Failed".to_string();
        job.error = Some(cause);
        job.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn set_report_id(&self, id: &str, report_id: impl Into<String>) -> Result<(), JobError> {
        let mut jobs = self.write();
        let job = jobs.get_mut(id).ok_or_else(|| JobError::NotFound(id.to_string()))?;
        job.report_id = Some(report_id.into());
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Job> {
        self.read().get(id).cloned()
    }

    /// Jobs that have not completed, newest first
    pub fn list_active(&self) -> Vec<Job> {
        self.sorted(|job| job.status != JobStatus::Completed)
    }

    /// Every job, newest first
    pub fn list_all(&self) -> Vec<Job> {
        self.sorted(|_| true)
    }

    /// Remove a job.
    ///
    /// Jobs that are downloading or analyzing are kept, since their pipeline
    /// task would keep writing to the record.
    pub fn delete(&self, id: &str) -> bool {
        let mut jobs = self.write();
        let in_flight = match jobs.get(id) {
            Some(job) => job.status.is_in_flight(),
            None => return false,
        };
        if in_flight {
            debug!("Refusing to delete in-flight job {}", id);
            return false;
        }
        jobs.remove(id).is_some()
    }

    fn sorted(&self, keep: impl Fn(&Job) -> bool) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.read().values().filter(|j| keep(*j)).cloned().collect();
        jobs.sort_by(|a, b| b.seq.cmp(&a.seq));
        jobs
    }
}
