//! Error types for the monitor.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that abort monitor startup or state handling.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Another monitor process holds the instance lock.
    #[error(
        "Another monitor is already running (pid {pid}, agent {}, started {started_at})",
        .agent.as_deref().unwrap_or("unknown")
    )]
    AlreadyRunning {
        pid: u32,
        agent: Option<String>,
        started_at: DateTime<Utc>,
        lock_path: PathBuf,
    },

    /// Filesystem error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// State or lock file could not be (de)serialized.
    #[error("JSON error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Slack client setup failed.
    #[error(transparent)]
    Slack(#[from] herald_slack::SlackError),
}

impl MonitorError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }
}

/// Result type for monitor operations.
pub type MonitorResult<T> = std::result::Result<T, MonitorError>;
