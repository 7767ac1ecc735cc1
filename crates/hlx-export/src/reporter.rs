//! Progress reporting from a running pipeline into the job store.

use std::sync::Arc;

use tracing::{debug, warn};

use hlx_models::{JobId, JobUpdate};
use hlx_store::JobStore;

/// Writes non-terminal updates for one job.
///
/// Store failures are logged and swallowed; a pipeline never fails because
/// a progress write did. Terminal records are written by the controller.
#[derive(Clone)]
pub struct JobReporter {
    store: Arc<dyn JobStore>,
    job_id: JobId,
}

impl JobReporter {
    pub fn new(store: Arc<dyn JobStore>, job_id: JobId) -> Self {
        Self { store, job_id }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub async fn report(&self, update: JobUpdate) {
        debug_assert!(
            update.stage.map_or(true, |s| !s.is_terminal()),
            "terminal updates belong to the controller"
        );

        match self.store.update(&self.job_id, &update).await {
            Ok(job) => debug!(
                job_id = %self.job_id,
                stage = %job.stage,
                progress = job.progress,
                "Reported progress"
            ),
            Err(e) => warn!(job_id = %self.job_id, "Failed to report progress: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hlx_models::{ExportJob, ExportKind, ExportStage, ProjectId};
    use hlx_store::InMemoryJobStore;

    #[tokio::test]
    async fn test_report_writes_and_tolerates_terminal_records() {
        let store = Arc::new(InMemoryJobStore::new());
        let job = store
            .create(ExportJob::new(ProjectId::from(1), ExportKind::Individual, Vec::new()))
            .await
            .unwrap();
        let reporter = JobReporter::new(store.clone(), job.id.clone());

        reporter.report(JobUpdate::stage(ExportStage::Probing)).await;
        assert_eq!(store.get(&job.id).await.unwrap().stage, ExportStage::Probing);

        store.update(&job.id, &JobUpdate::cancelled(Vec::new())).await.unwrap();
        reporter.report(JobUpdate::unit_done(1, 2, Vec::new())).await;

        let stored = store.get(&job.id).await.unwrap();
        assert_eq!(stored.stage, ExportStage::Cancelled);
        assert_eq!(stored.progress, 0);
    }
}
