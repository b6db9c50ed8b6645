//! Error types for the package triage pipeline

use thiserror::Error;

/// Main error type for pipeline operations
#[derive(Error, Debug)]
pub enum ScanError {
    /// Input package missing, unreadable or otherwise unusable
    #[error("Validation error: {0}")]
    Validation(String),

    /// Invalid configuration or pattern source
    #[error("Configuration error: {0}")]
    Config(String),

    /// Decompiler failed and left no usable output
    #[error("Decompile error: {0}")]
    Decompile(String),

    /// A single analyzer failed
    #[error("Analyzer {analyzer} failed: {message}")]
    Analyzer { analyzer: String, message: String },

    /// Report could not be written
    #[error("Export error: {0}")]
    Export(String),

    /// Webhook delivery failed
    #[error("Notification error: {0}")]
    Notification(String),

    /// External tool could not be run
    #[error("{tool} failed: {message}")]
    Tool { tool: String, message: String },

    /// Package download failed
    #[error("Download error: {0}")]
    Download(String),

    /// Saved report does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unexpected fault inside the pipeline
    #[error("Internal error: {0}")]
    Internal(String),

    /// Job table rejected an update
    #[error(transparent)]
    Job(#[from] JobError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Regex error
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl ScanError {
    /// Build an analyzer error
    pub fn analyzer(analyzer: impl Into<String>, message: impl Into<String>) -> Self {
        ScanError::Analyzer {
            analyzer: analyzer.into(),
            message: message.into(),
        }
    }

    /// Build a tool error
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        ScanError::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

/// Errors raised by the job table
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// No job with this id
    #[error("Job not found: {0}")]
    NotFound(String),

    /// Transition not allowed by the job state machine
    #[error("Invalid transition for job {id}: {from} -> {to}")]
    InvalidTransition { id: String, from: String, to: String },
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, ScanError>;
