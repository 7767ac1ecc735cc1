//! JSON-file job store.
//!
//! The whole record set is kept in memory and rewritten after every
//! mutation. Writes go to a temp file that is renamed over the store file,
//! so a crash leaves either the old or the new snapshot on disk.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

use hlx_models::{ExportJob, JobId, JobUpdate};

use crate::error::{StoreError, StoreResult};
use crate::filter::JobFilter;
use crate::store::{oldest_first, JobStore};

/// [`JobStore`] persisted to a single JSON file.
#[derive(Debug)]
pub struct FileJobStore {
    path: PathBuf,
    jobs: Mutex<Vec<ExportJob>>,
}

impl FileJobStore {
    /// Open the store at `path`, loading existing records if the file exists.
    pub async fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();

        let jobs: Vec<ExportJob> = match fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => Vec::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        info!(path = %path.display(), records = jobs.len(), "Opened job store");

        Ok(Self {
            path,
            jobs: Mutex::new(jobs),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, jobs: &[ExportJob]) -> StoreResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let tmp = self.path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(jobs)?;
        fs::write(&tmp, &body).await?;

        if let Err(e) = fs::rename(&tmp, &self.path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!(path = %self.path.display(), records = jobs.len(), "Persisted job store");
        Ok(())
    }
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn create(&self, job: ExportJob) -> StoreResult<ExportJob> {
        let mut jobs = self.jobs.lock().await;
        if jobs.iter().any(|j| j.id == job.id) {
            return Err(StoreError::Duplicate(job.id));
        }

        jobs.push(job.clone());
        if let Err(e) = self.persist(&jobs).await {
            jobs.pop();
            return Err(e);
        }
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
        let idx = jobs
            .iter()
            .position(|j| &j.id == id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        let previous = jobs[idx].clone();
        jobs[idx].apply(update, Utc::now())?;

        // Keep memory and disk in agreement when the write fails.
        if let Err(e) = self.persist(&jobs).await {
            jobs[idx] = previous;
            return Err(e);
        }
        Ok(jobs[idx].clone())
    }

    async fn get(&self, id: &JobId) -> StoreResult<ExportJob> {
        let jobs = self.jobs.lock().await;
        jobs.iter()
            .find(|j| &j.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }
}
