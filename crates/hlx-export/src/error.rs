//! Export error types.

use thiserror::Error;

use hlx_media::MediaError;
use hlx_models::{ExportErrorKind, JobId, ProjectId};
use hlx_store::StoreError;

pub type ExportResult<T> = Result<T, ExportError>;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Invalid export request: {0}")]
    Validation(String),

    #[error("Unknown project: {0}")]
    UnknownProject(ProjectId),

    #[error("Export job not found: {0}")]
    NotFound(JobId),

    #[error("Encoder unavailable: {0}")]
    EncoderUnavailable(String),

    #[error("Export service is shutting down")]
    ShuttingDown,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),
}

impl ExportError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn encoder_unavailable(msg: impl Into<String>) -> Self {
        Self::EncoderUnavailable(msg.into())
    }

    /// Map a store lookup failure, turning a missing record into `NotFound`.
    pub fn from_lookup(id: &JobId, e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => Self::NotFound(id.clone()),
            other => Self::Store(other),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExportError::Media(e) if e.is_cancelled())
    }

    /// Cause recorded on a failed job.
    pub fn kind(&self) -> ExportErrorKind {
        match self {
            ExportError::Validation(_) | ExportError::UnknownProject(_) => {
                ExportErrorKind::Validation
            }
            ExportError::Media(MediaError::SourceUnavailable { .. }) => {
                ExportErrorKind::SourceUnavailable
            }
            ExportError::Media(MediaError::Io(_))
            | ExportError::Store(_)
            | ExportError::NotFound(_)
            | ExportError::ShuttingDown => ExportErrorKind::Io,
            ExportError::Media(_) | ExportError::EncoderUnavailable(_) => {
                ExportErrorKind::EncodeFailure
            }
        }
    }

    /// Stable code used on the command wire.
    pub fn code(&self) -> &'static str {
        match self {
            ExportError::Validation(_) => "validation",
            ExportError::UnknownProject(_) => "unknown_project",
            ExportError::NotFound(_) => "not_found",
            ExportError::EncoderUnavailable(_) => "encoder_unavailable",
            ExportError::ShuttingDown => "shutting_down",
            ExportError::Store(_) => "store",
            ExportError::Media(_) => "media",
        }
    }

    /// Message persisted on the job record, including encoder stderr.
    pub fn diagnostic(&self) -> String {
        match self {
            ExportError::Media(e) => e.diagnostic(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            ExportError::validation("bad").kind(),
            ExportErrorKind::Validation
        );
        assert_eq!(
            ExportError::from(MediaError::source_unavailable("/a.mp4", "missing")).kind(),
            ExportErrorKind::SourceUnavailable
        );
        assert_eq!(
            ExportError::from(MediaError::encode_failed("boom", None, Some(1))).kind(),
            ExportErrorKind::EncodeFailure
        );
        assert_eq!(
            ExportError::from(MediaError::Timeout(5)).kind(),
            ExportErrorKind::EncodeFailure
        );
        assert_eq!(
            ExportError::from(MediaError::Io(std::io::Error::other("disk"))).kind(),
            ExportErrorKind::Io
        );
    }

    #[test]
    fn test_diagnostic_includes_stderr() {
        let err = ExportError::from(MediaError::encode_failed(
            "FFmpeg exited with error",
            Some("Invalid data found".to_string()),
            Some(1),
        ));
        let msg = err.diagnostic();
        assert!(msg.contains("exit code 1"));
        assert!(msg.contains("Invalid data found"));
    }

    #[test]
    fn test_lookup_maps_not_found() {
        let id = JobId::from_string("j1");
        let err = ExportError::from_lookup(&id, StoreError::NotFound(id.clone()));
        assert!(matches!(err, ExportError::NotFound(_)));
        assert_eq!(err.code(), "not_found");
    }
}
