//! Orchestrator-specific error types

use shared::{Phase, ProcessKey, SharedError};
use std::path::PathBuf;
use thiserror::Error;

use crate::core::Milestone;

#[derive(Error, Debug)]
pub enum BenchError {
    #[error("Failed to spawn {label}: {source}")]
    ProcessSpawnFailed {
        label: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No active process for key {key}")]
    ProcessNotFound { key: ProcessKey },

    #[error("Failed to signal {label}: {message}")]
    SignalFailed { label: String, message: String },

    #[error("Service health checks failed: {}", describe_failed(.failed))]
    HealthCheckFailed { failed: Vec<String> },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Run cancelled: {reason}")]
    Cancelled { reason: String },

    #[error("Illegal phase transition: {from:?} -> {to}")]
    PhaseOrder { from: Option<Phase>, to: Phase },

    #[error("Milestone {milestone} cannot be stamped: {reason}")]
    MilestoneOrder { milestone: Milestone, reason: String },

    #[error("File system operation failed: {operation} on {path}: {source}")]
    FileSystemError {
        operation: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Shared(#[from] SharedError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl BenchError {
    pub fn fs(operation: impl Into<String>, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BenchError::FileSystemError {
            operation: operation.into(),
            path: path.into(),
            source,
        }
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        BenchError::Cancelled { reason: reason.into() }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, BenchError::Cancelled { .. })
    }

    /// Process exit code for a run that ended with this error
    pub fn exit_code(&self) -> u8 {
        match self {
            BenchError::Shared(_) => EXIT_CONFIG,
            _ => EXIT_FAILURE,
        }
    }
}

/// Health gate failure, interrupt, or any other aborted run
pub const EXIT_FAILURE: u8 = 1;

/// The configuration could not be loaded or is invalid
pub const EXIT_CONFIG: u8 = 2;

fn describe_failed(failed: &[String]) -> String {
    if failed.is_empty() {
        "no endpoints were checked".to_string()
    } else {
        failed.join(", ")
    }
}

pub type BenchResult<T> = Result<T, BenchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_failure_names_backends() {
        let err = BenchError::HealthCheckFailed {
            failed: vec!["qdrant".to_string(), "elasticsearch".to_string()],
        };
        assert_eq!(err.to_string(), "Service health checks failed: qdrant, elasticsearch");

        let empty = BenchError::HealthCheckFailed { failed: vec![] };
        assert_eq!(empty.to_string(), "Service health checks failed: no endpoints were checked");
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(BenchError::HealthCheckFailed { failed: vec![] }.exit_code(), EXIT_FAILURE);
        assert_eq!(BenchError::cancelled("received SIGTERM").exit_code(), EXIT_FAILURE);
        assert_eq!(
            BenchError::Shared(SharedError::invalid("heavy_write_secs", 0)).exit_code(),
            EXIT_CONFIG
        );
    }
}
