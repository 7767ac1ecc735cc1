//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Number of trailing stderr lines kept for diagnostics.
pub const STDERR_TAIL_LINES: usize = 20;

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("Encoder provisioning failed: {0}")]
    ProvisionFailed(String),

    #[error("Encoder failed: {message}")]
    EncodeFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("Source clip unavailable: {path}: {reason}")]
    SourceUnavailable { path: PathBuf, reason: String },

    #[error("Output missing or empty: {0}")]
    InvalidOutput(PathBuf),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    /// Create an encoder failure error.
    pub fn encode_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::EncodeFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn source_unavailable(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, MediaError::Cancelled)
    }

    /// Human-readable description including captured encoder output.
    pub fn diagnostic(&self) -> String {
        match self {
            MediaError::EncodeFailed {
                message,
                stderr,
                exit_code,
            } => {
                let mut out = message.clone();
                if let Some(code) = exit_code {
                    out.push_str(&format!(" (exit code {})", code));
                }
                if let Some(stderr) = stderr.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
                    out.push_str(": ");
                    out.push_str(stderr);
                }
                out
            }
            other => other.to_string(),
        }
    }
}
