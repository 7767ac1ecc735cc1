//! The job record store seam.

use async_trait::async_trait;

use hlx_models::{ExportJob, JobId, JobUpdate};

use crate::error::StoreResult;
use crate::filter::JobFilter;

/// Durable storage of [`ExportJob`] records.
///
/// Updates go through [`ExportJob::apply`], so every implementation rejects
/// writes to terminal records and never lets progress move backwards.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new record. Fails with `Duplicate` if the id is taken.
    async fn create(&self, job: ExportJob) -> StoreResult<ExportJob>;

    /// Records matching `filter`, oldest first.
    async fn query(&self, filter: &JobFilter) -> StoreResult<Vec<ExportJob>>;

    /// Apply a partial update and return the stored record.
    async fn update(&self, id: &JobId, update: &JobUpdate) -> StoreResult<ExportJob>;

    async fn get(&self, id: &JobId) -> StoreResult<ExportJob>;
}

/// Sort records oldest first, keeping insertion order for equal timestamps.
pub(crate) fn oldest_first(mut jobs: Vec<ExportJob>) -> Vec<ExportJob> {
    jobs.sort_by_key(|job| job.created_at);
    jobs
}
