//! Store error types.

use thiserror::Error;

use hlx_models::{AlreadyTerminal, JobId};

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while reading or writing job records.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Job {0} is already terminal")]
    AlreadyTerminal(JobId),

    #[error("Job already exists: {0}")]
    Duplicate(JobId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_already_terminal(&self) -> bool {
        matches!(self, StoreError::AlreadyTerminal(_))
    }
}

impl From<AlreadyTerminal> for StoreError {
    fn from(e: AlreadyTerminal) -> Self {
        StoreError::AlreadyTerminal(e.0)
    }
}
