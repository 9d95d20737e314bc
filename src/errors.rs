use std::process::ExitStatus;

use thiserror::Error;

use crate::backup::Phase;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid storage target `{url}`: {reason}")]
    InvalidTarget { url: String, reason: String },

    #[error("Failed to {action}")]
    Workspace {
        action: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{phase} stage failed: {source}{}", stderr_suffix(.stderr))]
    StageExecution {
        phase: Phase,
        stderr: String,
        #[source]
        source: StageFailure,
    },

    #[error("Upload of {key} failed")]
    Upload {
        key: String,
        #[source]
        source: BoxError,
    },

    #[error("Retention cleanup failed")]
    Cleanup {
        #[source]
        source: BoxError,
    },

    #[error("Operation cancelled")]
    Cancelled,
}

/// Why an external stage (or the built-in archiver standing in for one) failed.
#[derive(Error, Debug)]
pub enum StageFailure {
    #[error("could not spawn process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("process exited with {0}")]
    Exit(ExitStatus),

    #[error("I/O error: {0}")]
    Io(#[source] std::io::Error),
}

impl BackupError {
    pub fn cleanup(source: impl Into<BoxError>) -> Self {
        BackupError::Cleanup { source: source.into() }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, BackupError::Cancelled)
    }

    /// Process exit code for this error: 2 for configuration, 130 for an
    /// operator interrupt, 1 for everything else.
    pub fn exit_code(&self) -> u8 {
        match self {
            BackupError::Config(_) | BackupError::InvalidTarget { .. } => 2,
            BackupError::Cancelled => 130,
            _ => 1,
        }
    }
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("\nStderr: {}", trimmed)
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
