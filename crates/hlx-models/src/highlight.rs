//! Highlight selections and export requests.

use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::job::{ExportKind, ProjectId};
use crate::timestamp::{parse_range, TimeRange, TimestampError};

/// A user-selected region of a source clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Highlight {
    /// Source clip file
    pub source: PathBuf,

    /// Start timestamp (HH:MM:SS, HH:MM:SS.mmm, MM:SS or SS)
    pub start: String,

    /// End timestamp
    pub end: String,

    /// Optional title, used to name individual outputs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Highlight {
    /// Create a new highlight.
    pub fn new(source: impl Into<PathBuf>, start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            start: start.into(),
            end: end.into(),
            title: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Parsed start/end in seconds.
    pub fn range(&self) -> Result<TimeRange, TimestampError> {
        parse_range(&self.start, &self.end)
    }

    /// Filesystem-safe slug of the title, if there is one.
    pub fn slug(&self) -> Option<String> {
        let title = self.title.as_deref()?;
        let mut slug = String::with_capacity(title.len());
        let mut last_dash = true;
        for c in title.chars() {
            if c.is_ascii_alphanumeric() {
                slug.push(c.to_ascii_lowercase());
                last_dash = false;
            } else if !last_dash {
                slug.push('-');
                last_dash = true;
            }
        }
        let slug: String = slug.trim_end_matches('-').chars().take(48).collect();
        let slug = slug.trim_end_matches('-').to_string();
        (!slug.is_empty()).then_some(slug)
    }
}

/// A request to export highlights of one project.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExportRequest {
    pub project_id: ProjectId,
    pub kind: ExportKind,
    pub highlights: Vec<Highlight>,
}

impl ExportRequest {
    pub fn new(project_id: impl Into<ProjectId>, kind: ExportKind, highlights: Vec<Highlight>) -> Self {
        Self {
            project_id: project_id.into(),
            kind,
            highlights,
        }
    }

    /// Validate the request.
    ///
    /// Source files are not touched here; their availability is checked when
    /// the job runs.
    pub fn validate(&self) -> Result<(), String> {
        if self.project_id.as_str().trim().is_empty() {
            return Err("Project ID is required".to_string());
        }

        if self.highlights.is_empty() {
            return Err("At least one highlight must be selected".to_string());
        }

        for (idx, highlight) in self.highlights.iter().enumerate() {
            if highlight.source.as_os_str().is_empty() {
                return Err(format!("Highlight {} has no source clip", idx + 1));
            }
            highlight
                .range()
                .map_err(|e| format!("Highlight {}: {}", idx + 1, e))?;
        }

        Ok(())
    }
}
