//! Export job records and their state transitions.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::highlight::Highlight;

/// Message recorded on jobs that were interrupted by a process restart.
pub const RESTART_INTERRUPTED_MESSAGE: &str = "Application was restarted during export";

/// Unique identifier for an export job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the project a job belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ProjectId(pub String);

impl ProjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<u64> for ProjectId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

/// Shape of the delivered output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExportKind {
    /// One file per highlight
    Individual,
    /// All highlights joined into one file
    Stitched,
}

impl ExportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportKind::Individual => "individual",
            ExportKind::Stitched => "stitched",
        }
    }
}

impl fmt::Display for ExportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stage of an export job.
///
/// Stages advance in declaration order until one of the three terminal
/// stages is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExportStage {
    #[default]
    Queued,
    Probing,
    Preparing,
    Encoding,
    Finalizing,
    Completed,
    Cancelled,
    Failed,
}

impl ExportStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportStage::Queued => "queued",
            ExportStage::Probing => "probing",
            ExportStage::Preparing => "preparing",
            ExportStage::Encoding => "encoding",
            ExportStage::Finalizing => "finalizing",
            ExportStage::Completed => "completed",
            ExportStage::Cancelled => "cancelled",
            ExportStage::Failed => "failed",
        }
    }

    /// Check if this is a terminal stage (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExportStage::Completed | ExportStage::Cancelled | ExportStage::Failed
        )
    }
}

impl fmt::Display for ExportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine-readable cause attached to failed or interrupted jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExportErrorKind {
    Validation,
    SourceUnavailable,
    EncodeFailure,
    Io,
    RestartInterrupted,
}

impl ExportErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportErrorKind::Validation => "validation",
            ExportErrorKind::SourceUnavailable => "source_unavailable",
            ExportErrorKind::EncodeFailure => "encode_failure",
            ExportErrorKind::Io => "io",
            ExportErrorKind::RestartInterrupted => "restart_interrupted",
        }
    }
}

impl fmt::Display for ExportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persistent record of one export request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExportJob {
    pub id: JobId,
    pub project_id: ProjectId,
    pub kind: ExportKind,
    #[serde(default)]
    pub stage: ExportStage,
    /// Progress percentage (0-100), never decreasing
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub is_complete: bool,
    #[serde(default)]
    pub is_cancelled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ExportErrorKind>,
    /// Produced files, in the order they landed
    #[serde(default)]
    pub output_paths: Vec<PathBuf>,
    /// Selection the job was created with
    #[serde(default)]
    pub highlights: Vec<Highlight>,
    /// Planned encoder invocations (0 until planning is done)
    #[serde(default)]
    pub units_total: u32,
    #[serde(default)]
    pub units_completed: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Returned when an update targets a job that already reached a terminal stage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Job {0} is already terminal")]
pub struct AlreadyTerminal(pub JobId);

impl ExportJob {
    /// Create a new queued job.
    pub fn new(project_id: ProjectId, kind: ExportKind, highlights: Vec<Highlight>) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            project_id,
            kind,
            stage: ExportStage::Queued,
            progress: 0,
            is_complete: false,
            is_cancelled: false,
            error_message: None,
            error_kind: None,
            output_paths: Vec::new(),
            highlights,
            units_total: 0,
            units_completed: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// True when the job is neither complete nor cancelled.
    pub fn is_active(&self) -> bool {
        !self.is_complete && !self.is_cancelled
    }

    /// Apply an update, keeping the record's invariants.
    ///
    /// Terminal records are frozen. Progress and completed-unit counts never
    /// move backwards, and `completed_at` is stamped exactly once.
    pub fn apply(&mut self, update: &JobUpdate, now: DateTime<Utc>) -> Result<(), AlreadyTerminal> {
        if self.is_complete {
            return Err(AlreadyTerminal(self.id.clone()));
        }

        if let Some(total) = update.units_total {
            self.units_total = total;
        }
        if let Some(done) = update.units_completed {
            self.units_completed = self.units_completed.max(done);
        }
        if let Some(progress) = update.progress {
            self.progress = self.progress.max(progress.min(100));
        }
        if let Some(paths) = &update.output_paths {
            self.output_paths = paths.clone();
        }
        if let Some(message) = &update.error_message {
            self.error_message = Some(message.clone());
        }
        if let Some(kind) = update.error_kind {
            self.error_kind = Some(kind);
        }

        if let Some(stage) = update.stage {
            self.stage = stage;
            if stage == ExportStage::Completed {
                self.progress = 100;
            }
            if stage.is_terminal() {
                self.is_complete = true;
                self.is_cancelled = stage == ExportStage::Cancelled;
                self.completed_at = Some(now);
            }
        }

        self.updated_at = now;
        Ok(())
    }
}

/// Partial update to an [`ExportJob`].
///
/// Fields left as `None` are untouched. Completion and cancellation flags are
/// derived from the stage, so a record can never be cancelled without also
/// being complete.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobUpdate {
    pub stage: Option<ExportStage>,
    pub progress: Option<u8>,
    pub units_total: Option<u32>,
    pub units_completed: Option<u32>,
    pub output_paths: Option<Vec<PathBuf>>,
    pub error_message: Option<String>,
    pub error_kind: Option<ExportErrorKind>,
}

impl JobUpdate {
    /// Move to a new stage.
    pub fn stage(stage: ExportStage) -> Self {
        Self {
            stage: Some(stage),
            ..Default::default()
        }
    }

    /// Record a finished unit.
    pub fn unit_done(units_completed: u32, units_total: u32, output_paths: Vec<PathBuf>) -> Self {
        Self {
            progress: Some(progress_percent(units_completed, units_total)),
            units_completed: Some(units_completed),
            output_paths: Some(output_paths),
            ..Default::default()
        }
    }

    /// Terminal success.
    pub fn completed(output_paths: Vec<PathBuf>) -> Self {
        Self {
            stage: Some(ExportStage::Completed),
            progress: Some(100),
            output_paths: Some(output_paths),
            ..Default::default()
        }
    }

    /// Terminal cancellation, keeping whatever outputs already landed.
    pub fn cancelled(output_paths: Vec<PathBuf>) -> Self {
        Self {
            stage: Some(ExportStage::Cancelled),
            output_paths: Some(output_paths),
            ..Default::default()
        }
    }

    /// Terminal failure with its first cause.
    pub fn failed(kind: ExportErrorKind, message: impl Into<String>, output_paths: Vec<PathBuf>) -> Self {
        Self {
            stage: Some(ExportStage::Failed),
            error_kind: Some(kind),
            error_message: Some(message.into()),
            output_paths: Some(output_paths),
            ..Default::default()
        }
    }

    /// Terminal cancellation assigned at boot to jobs orphaned by a restart.
    pub fn restart_interrupted() -> Self {
        Self {
            stage: Some(ExportStage::Cancelled),
            error_kind: Some(ExportErrorKind::RestartInterrupted),
            error_message: Some(RESTART_INTERRUPTED_MESSAGE.to_string()),
            ..Default::default()
        }
    }

    pub fn with_units_total(mut self, total: u32) -> Self {
        self.units_total = Some(total);
        self
    }
}

/// Whole-percent progress for `done` out of `total` units.
pub fn progress_percent(done: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    ((u64::from(done.min(total)) * 100) / u64::from(total)) as u8
}
