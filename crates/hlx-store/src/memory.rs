//! In-process job store.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use hlx_models::{ExportJob, JobId, JobUpdate};

use crate::error::{StoreError, StoreResult};
use crate::filter::JobFilter;
use crate::store::{oldest_first, JobStore};

/// [`JobStore`] kept entirely in memory.
///
/// Records live for the lifetime of the value. Useful for tests and for
/// hosts that bring their own persistence.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<Vec<ExportJob>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing records, as if loaded after a restart.
    pub fn with_jobs(jobs: Vec<ExportJob>) -> Self {
        Self {
            jobs: Mutex::new(jobs),
        }
    }

    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, job: ExportJob) -> StoreResult<ExportJob> {
        let mut jobs = self.jobs.lock().await;
        if jobs.iter().any(|j| j.id == job.id) {
            return Err(StoreError::Duplicate(job.id));
        }
        jobs.push(job.clone());
        Ok(job)
    }

    async fn query(&self, filter: &JobFilter) -> StoreResult<Vec<ExportJob>> {
        let jobs = self.jobs.lock().await;
        Ok(oldest_first(
            jobs.iter().filter(|j| filter.matches(j)).cloned().collect(),
        ))
    }

    async fn update(&self, id: &JobId, update: &JobUpdate) -> StoreResult<ExportJob> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .iter_mut()
            .find(|j| &j.id == id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        job.apply(update, Utc::now())?;
        Ok(job.clone())
    }

    async fn get(&self, id: &JobId) -> StoreResult<ExportJob> {
        let jobs = self.jobs.lock().await;
        jobs.iter()
            .find(|j| &j.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hlx_models::{ExportKind, ExportStage, ProjectId};

    fn job(project: u64) -> ExportJob {
        ExportJob::new(ProjectId::from(project), ExportKind::Individual, Vec::new())
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = InMemoryJobStore::new();
        let created = tokio_test::assert_ok!(store.create(job(1)).await);

        assert_eq!(store.get(&created.id).await.unwrap(), created);
        assert!(matches!(
            store.create(created.clone()).await,
            Err(StoreError::Duplicate(_))
        ));
        assert!(store
            .get(&JobId::from_string("missing"))
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_query_is_oldest_first() {
        let store = InMemoryJobStore::new();
        let mut later = job(1);
        later.created_at = later.created_at + chrono::Duration::seconds(5);
        let earlier = job(1);

        store.create(later.clone()).await.unwrap();
        store.create(earlier.clone()).await.unwrap();
        store.create(job(2)).await.unwrap();

        let listed = store
            .query(&JobFilter::project(ProjectId::from(1)))
            .await
            .unwrap();
        let ids: Vec<_> = listed.iter().map(|j| j.id.clone()).collect();
        assert_eq!(ids, vec![earlier.id, later.id]);
    }

    #[tokio::test]
    async fn test_update_rejects_terminal_records() {
        let store = InMemoryJobStore::new();
        let created = store.create(job(1)).await.unwrap();

        let done = store
            .update(&created.id, &JobUpdate::completed(Vec::new()))
            .await
            .unwrap();
        assert_eq!(done.stage, ExportStage::Completed);
        assert_eq!(done.progress, 100);

        let err = store
            .update(&created.id, &JobUpdate::stage(ExportStage::Encoding))
            .await
            .unwrap_err();
        assert!(err.is_already_terminal());
        assert_eq!(store.get(&created.id).await.unwrap(), done);
    }

    #[tokio::test]
    async fn test_progress_never_regresses() {
        let store = InMemoryJobStore::new();
        let created = store.create(job(1)).await.unwrap();

        store
            .update(&created.id, &JobUpdate::unit_done(3, 4, Vec::new()))
            .await
            .unwrap();
        let after = store
            .update(&created.id, &JobUpdate::unit_done(1, 4, Vec::new()))
            .await
            .unwrap();

        assert_eq!(after.progress, 75);
        assert_eq!(after.units_completed, 3);
    }
}
