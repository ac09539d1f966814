use std::path::PathBuf;

use thiserror::Error;

/// Failures reported by listing and detail fetchers.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network or HTTP failure. Retryable.
    #[error("transport error fetching {url}: {message}")]
    Transport { url: String, message: String },

    /// The page was fetched but its shape was not recognised.
    #[error("parse error for {url}: {message}")]
    Parse { url: String, message: String },
}

impl FetchError {
    pub fn transport(url: impl Into<String>, message: impl ToString) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.to_string(),
        }
    }

    pub fn parse(url: impl Into<String>, message: impl ToString) -> Self {
        Self::Parse {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Short label used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::Parse { .. } => "parse",
        }
    }
}

/// Failures raised by the property store and the run log.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Tried to update a record that was never stored.
    #[error("property {0} not found in store")]
    NotFound(String),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt document {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("property id {0:?} cannot be used as a file name")]
    InvalidId(String),
}

/// Errors that terminate a sync run.
///
/// Per-item failures never surface here; they are recorded in the run summary.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("store setup failed: {0}")]
    Setup(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type StoreResult<T> = Result<T, StoreError>;
