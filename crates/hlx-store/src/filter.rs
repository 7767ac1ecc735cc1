//! Job record filters.

use hlx_models::{ExportJob, ProjectId};

/// Conjunction of optional field equality checks.
///
/// An empty filter matches every record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobFilter {
    pub project_id: Option<ProjectId>,
    pub is_complete: Option<bool>,
    pub is_cancelled: Option<bool>,
}

impl JobFilter {
    /// All records.
    pub fn all() -> Self {
        Self::default()
    }

    /// Records that are neither complete nor cancelled.
    pub fn active() -> Self {
        Self {
            is_complete: Some(false),
            is_cancelled: Some(false),
            ..Default::default()
        }
    }

    /// Records of one project.
    pub fn project(project_id: ProjectId) -> Self {
        Self {
            project_id: Some(project_id),
            ..Default::default()
        }
    }

    pub fn matches(&self, job: &ExportJob) -> bool {
        self.project_id.as_ref().map_or(true, |p| &job.project_id == p)
            && self.is_complete.map_or(true, |c| job.is_complete == c)
            && self.is_cancelled.map_or(true, |c| job.is_cancelled == c)
    }
}
