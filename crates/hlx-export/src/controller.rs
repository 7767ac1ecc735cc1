//! Job controller: the front door of the export service.
//!
//! The controller owns the registry of pipelines running in this process.
//! A job id is in the registry from the moment its record is created until
//! its terminal record has been written, and nowhere else.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex, Semaphore};
use tracing::{error, info, warn};

use hlx_media::{wait_for_cancel, EncoderInvoker, EncoderProvisioner};
use hlx_models::{
    ExportErrorKind, ExportJob, ExportRequest, ExportStage, JobId, JobUpdate, ProjectId,
};
use hlx_store::{JobFilter, JobStore, ProjectCatalog, StoreResult};

use crate::config::ExportConfig;
use crate::error::{ExportError, ExportResult};
use crate::metrics::{record_export_finished, record_export_started};
use crate::pipeline::{ExportPipeline, PipelineOutcome};
use crate::recovery::{RecoveryManager, RecoveryReport};
use crate::reporter::JobReporter;

/// Attempts at writing a job's terminal record before falling back to a
/// bare failure record.
pub const TERMINAL_WRITE_ATTEMPTS: u32 = 3;

const TERMINAL_WRITE_BACKOFF: Duration = Duration::from_millis(100);

/// Collaborators the controller is built from.
pub struct ControllerDeps {
    pub store: Arc<dyn JobStore>,
    pub catalog: Arc<dyn ProjectCatalog>,
    pub provisioner: Arc<EncoderProvisioner>,
    pub invoker: Arc<dyn EncoderInvoker>,
}

/// Starts, cancels and reports on export jobs.
#[derive(Clone)]
pub struct JobController {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn JobStore>,
    catalog: Arc<dyn ProjectCatalog>,
    provisioner: Arc<EncoderProvisioner>,
    pipeline: ExportPipeline,
    job_semaphore: Arc<Semaphore>,
    registry: Mutex<HashMap<JobId, watch::Sender<bool>>>,
    shutting_down: AtomicBool,
    shutdown_timeout: Duration,
}

impl JobController {
    /// Recover orphaned jobs, then build the controller.
    ///
    /// No job can be started before recovery has finished, since the
    /// controller does not exist until then.
    pub async fn boot(
        config: &ExportConfig,
        deps: ControllerDeps,
    ) -> ExportResult<(Self, RecoveryReport)> {
        let report = RecoveryManager::new(Arc::clone(&deps.store)).run().await?;

        let pipeline = ExportPipeline::new(
            Arc::clone(&deps.provisioner),
            deps.invoker,
            &config.work_dir,
            &config.output_dir,
        );

        let max_concurrent = config.max_concurrent_exports.max(1);
        info!(
            "Export controller ready with {} max concurrent exports",
            max_concurrent
        );

        let controller = Self {
            inner: Arc::new(Inner {
                store: deps.store,
                catalog: deps.catalog,
                provisioner: deps.provisioner,
                pipeline,
                job_semaphore: Arc::new(Semaphore::new(max_concurrent)),
                registry: Mutex::new(HashMap::new()),
                shutting_down: AtomicBool::new(false),
                shutdown_timeout: config.shutdown_timeout,
            }),
        };

        Ok((controller, report))
    }

    /// Validate and queue an export, returning as soon as it is spawned.
    pub async fn start_export(&self, request: ExportRequest) -> ExportResult<JobId> {
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            return Err(ExportError::ShuttingDown);
        }

        request.validate().map_err(ExportError::Validation)?;

        if !self.inner.catalog.project_exists(&request.project_id).await {
            return Err(ExportError::UnknownProject(request.project_id));
        }

        self.inner
            .provisioner
            .resolve()
            .await
            .map_err(|e| ExportError::encoder_unavailable(e.to_string()))?;

        let job = self
            .inner
            .store
            .create(ExportJob::new(
                request.project_id,
                request.kind,
                request.highlights,
            ))
            .await?;

        let (cancel_tx, cancel_rx) = watch::channel(false);
        {
            let mut registry = self.inner.registry.lock().await;
            let previous = registry.insert(job.id.clone(), cancel_tx);
            debug_assert!(previous.is_none(), "store issued a duplicate job id");
        }

        info!(
            job_id = %job.id,
            project_id = %job.project_id,
            kind = %job.kind,
            highlights = job.highlights.len(),
            "Export queued"
        );
        record_export_started(job.kind.as_str());

        let job_id = job.id.clone();
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            Inner::execute_job(inner, job, cancel_rx).await;
        });

        Ok(job_id)
    }

    /// Signal cancellation to a job running in this process.
    ///
    /// Returns once the signal is delivered; the job stops asynchronously.
    /// A job already delivering its outputs stops before the next file is
    /// moved, so some files may already be in the delivery directory.
    pub async fn cancel_export(&self, job_id: &JobId) -> ExportResult<()> {
        let registry = self.inner.registry.lock().await;
        let cancel_tx = registry
            .get(job_id)
            .ok_or_else(|| ExportError::NotFound(job_id.clone()))?;

        // The receiver lives as long as the job task, which removes the
        // entry before exiting, so a send failure means it is already done.
        let _ = cancel_tx.send(true);
        info!(job_id = %job_id, "Export cancellation requested");
        Ok(())
    }

    pub async fn get_export_progress(&self, job_id: &JobId) -> ExportResult<ExportJob> {
        self.inner
            .store
            .get(job_id)
            .await
            .map_err(|e| ExportError::from_lookup(job_id, e))
    }

    /// Jobs of a project, oldest first.
    pub async fn list_export_jobs(&self, project_id: &ProjectId) -> ExportResult<Vec<ExportJob>> {
        Ok(self
            .inner
            .store
            .query(&JobFilter::project(project_id.clone()))
            .await?)
    }

    /// Ids of jobs queued or running in this process.
    pub async fn active_jobs(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self.inner.registry.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Stop accepting work, cancel everything running and wait for the
    /// terminal records to be written.
    ///
    /// The installed encoder is torn down only once every job has stopped.
    /// Returns the number of jobs still running when the timeout expired.
    pub async fn shutdown(&self) -> usize {
        self.inner.shutting_down.store(true, Ordering::SeqCst);

        {
            let registry = self.inner.registry.lock().await;
            if !registry.is_empty() {
                info!("Cancelling {} running exports for shutdown", registry.len());
            }
            for cancel_tx in registry.values() {
                let _ = cancel_tx.send(true);
            }
        }

        let drained = tokio::time::timeout(self.inner.shutdown_timeout, self.wait_for_jobs()).await;
        let remaining = self.inner.registry.lock().await.len();
        if drained.is_err() || remaining > 0 {
            warn!(
                "Shutdown timed out after {:?} with {} exports still running, keeping encoder installed",
                self.inner.shutdown_timeout, remaining
            );
        } else {
            self.inner.provisioner.teardown().await;
            info!("Export controller stopped");
        }
        remaining
    }

    async fn wait_for_jobs(&self) {
        loop {
            if self.inner.registry.lock().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

impl Inner {
    /// Wait for a worker slot, run the pipeline and write the terminal record.
    async fn execute_job(inner: Arc<Inner>, job: ExportJob, cancel_rx: watch::Receiver<bool>) {
        let job_id = job.id.clone();

        let permit = tokio::select! {
            biased;
            _ = wait_for_cancel(Some(cancel_rx.clone())) => None,
            permit = Arc::clone(&inner.job_semaphore).acquire_owned() => permit.ok(),
        };

        let outcome = match permit {
            Some(permit) => {
                let _permit = permit;
                let reporter = JobReporter::new(Arc::clone(&inner.store), job_id.clone());
                inner.pipeline.run(&job, &reporter, cancel_rx).await
            }
            None => {
                info!(job_id = %job_id, "Export cancelled while queued");
                PipelineOutcome::Cancelled {
                    output_paths: Vec::new(),
                }
            }
        };

        inner.finish(&job_id, outcome).await;
    }

    /// Write the terminal record, then release the job.
    ///
    /// The job leaves the registry only after a terminal record was attempted
    /// with retries, and after a bare failure record when those all failed.
    async fn finish(&self, job_id: &JobId, outcome: PipelineOutcome) {
        let mut label = outcome.label();

        match self.write_terminal(job_id, &outcome.into_update()).await {
            Ok(job) => info!(
                job_id = %job_id,
                stage = %job.stage,
                progress = job.progress,
                outputs = job.output_paths.len(),
                "Export finalized"
            ),
            Err(e) if e.is_not_found() || e.is_already_terminal() => {
                warn!(job_id = %job_id, "Terminal record not written: {}", e)
            }
            Err(e) => {
                error!(job_id = %job_id, "Failed to write terminal record: {}", e);
                let fallback = JobUpdate {
                    output_paths: None,
                    ..JobUpdate::failed(
                        ExportErrorKind::Io,
                        format!("Failed to record {} outcome: {}", label, e),
                        Vec::new(),
                    )
                };
                match self.store.update(job_id, &fallback).await {
                    Ok(_) => warn!(job_id = %job_id, "Recorded export as failed after store errors"),
                    Err(e) => error!(job_id = %job_id, "Failed to write fallback record: {}", e),
                }
                label = ExportStage::Failed.as_str();
            }
        }
        record_export_finished(label);

        self.registry.lock().await.remove(job_id);
    }

    async fn write_terminal(&self, job_id: &JobId, update: &JobUpdate) -> StoreResult<ExportJob> {
        let mut attempt = 1;
        loop {
            match self.store.update(job_id, update).await {
                Ok(job) => return Ok(job),
                Err(e) if e.is_not_found() || e.is_already_terminal() => return Err(e),
                Err(e) if attempt >= TERMINAL_WRITE_ATTEMPTS => return Err(e),
                Err(e) => {
                    let delay = TERMINAL_WRITE_BACKOFF * 2u32.pow(attempt - 1);
                    warn!(
                        job_id = %job_id,
                        attempt,
                        "Terminal record write failed, retrying in {:?}: {}",
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
