//! Structured job logging utilities.

use tracing::{error, info, warn, Span};

use hlx_models::{ExportKind, JobId, ProjectId};

/// Logger carrying the identifying fields of one export job.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    project_id: String,
    kind: ExportKind,
}

impl JobLogger {
    pub fn new(job_id: &JobId, project_id: &ProjectId, kind: ExportKind) -> Self {
        Self {
            job_id: job_id.to_string(),
            project_id: project_id.to_string(),
            kind,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            project_id = %self.project_id,
            kind = %self.kind,
            "Export started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            project_id = %self.project_id,
            kind = %self.kind,
            "Export progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            project_id = %self.project_id,
            kind = %self.kind,
            "Export warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            project_id = %self.project_id,
            kind = %self.kind,
            "Export error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            project_id = %self.project_id,
            kind = %self.kind,
            "Export finished: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Span wrapping the whole pipeline run.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "export",
            job_id = %self.job_id,
            project_id = %self.project_id,
            kind = %self.kind
        )
    }
}
