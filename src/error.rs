//! Error types for the monitoring engine.
//!
//! Errors fall into two families: [`MonitorError`] covers conditions that
//! indicate a broken contract (identity changes, unknown sort keys, corrupt
//! metric values) and aborts the current cycle, while [`SourceError`] covers
//! a snapshot source that could not deliver data this tick.

use thiserror::Error;

/// Fatal engine errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MonitorError {
    #[error("process identity changed between samples: expected pid {expected}, found pid {found}")]
    ProcessIdentity { expected: u32, found: u32 },

    #[error("thread identity changed between samples: expected tid {expected}, found tid {found}")]
    ThreadIdentity { expected: u32, found: u32 },

    #[error("unsupported sort key '{0}'")]
    UnsupportedSortKey(String),

    #[error("invalid {metric} value {value}")]
    InvalidMetric { metric: &'static str, value: f64 },
}

/// Recoverable snapshot source failures.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("process tree unavailable: {0}")]
    Unavailable(String),

    #[error("root process {0} not found")]
    RootNotFound(u32),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {what}: {detail}")]
    Parse { what: String, detail: String },

    #[error("snapshot task failed: {0}")]
    Task(String),

    #[error("invalid test data: {0}")]
    TestData(String),
}

impl SourceError {
    pub(crate) fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        SourceError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(what: impl Into<String>, detail: impl Into<String>) -> Self {
        SourceError::Parse {
            what: what.into(),
            detail: detail.into(),
        }
    }
}
