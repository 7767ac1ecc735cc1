//! Shared harness for export integration tests.

#![allow(dead_code)]

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::watch;

use hlx_export::{ControllerDeps, ExportConfig, JobController, RecoveryReport};
use hlx_media::{
    wait_for_cancel, EncodeUnit, EncoderInvoker, EncoderProvisioner, EncoderSource, MediaError,
    MediaResult,
};
use hlx_models::{ExportJob, ExportStage, JobId, JobUpdate};
use hlx_store::{
    InMemoryJobStore, InMemoryProjectCatalog, JobFilter, JobStore, StoreError, StoreResult,
};

pub const PROJECT: &str = "7";

/// Encoder stand-in that writes outputs instead of running a process.
#[derive(Default)]
pub struct FakeInvoker {
    calls: AtomicUsize,
    units: Mutex<Vec<EncodeUnit>>,
    /// Call index that writes a partial file and then waits for cancellation
    pub block_at: Option<usize>,
    /// Call index that fails like a crashing encoder
    pub fail_at: Option<usize>,
    /// Call index that hangs and ignores cancellation
    pub stall_at: Option<usize>,
}

impl FakeInvoker {
    pub fn blocking_at(index: usize) -> Self {
        Self {
            block_at: Some(index),
            ..Default::default()
        }
    }

    pub fn failing_at(index: usize) -> Self {
        Self {
            fail_at: Some(index),
            ..Default::default()
        }
    }

    pub fn stalling_at(index: usize) -> Self {
        Self {
            stall_at: Some(index),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn units(&self) -> Vec<EncodeUnit> {
        self.units.lock().expect("units lock").clone()
    }
}

#[async_trait]
impl EncoderInvoker for FakeInvoker {
    async fn invoke(
        &self,
        _encoder: &Path,
        unit: &EncodeUnit,
        cancel: watch::Receiver<bool>,
    ) -> MediaResult<()> {
        self.units.lock().expect("units lock").push(unit.clone());

        let index = self.calls.load(Ordering::SeqCst);
        if Some(index) == self.fail_at {
            self.calls.fetch_add(1, Ordering::SeqCst);
            return Err(MediaError::encode_failed(
                "FFmpeg exited with error",
                Some("moov atom not found".to_string()),
                Some(1),
            ));
        }

        if Some(index) == self.stall_at {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<()>().await;
        }

        if Some(index) == self.block_at {
            tokio::fs::write(unit.output(), b"partial").await?;
            // Count the call only once the partial file is on disk.
            self.calls.fetch_add(1, Ordering::SeqCst);
            wait_for_cancel(Some(cancel)).await;
            return Err(MediaError::Cancelled);
        }

        tokio::fs::write(unit.output(), unit.to_string()).await?;
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// In-memory store that remembers the progress of every accepted update.
#[derive(Default)]
pub struct RecordingStore {
    pub inner: InMemoryJobStore,
    history: Mutex<Vec<(JobId, ExportStage, u8)>>,
    /// Terminal updates still to be rejected with an I/O error
    terminal_failures: AtomicUsize,
}

impl RecordingStore {
    pub fn with_jobs(jobs: Vec<ExportJob>) -> Self {
        Self {
            inner: InMemoryJobStore::with_jobs(jobs),
            ..Default::default()
        }
    }

    /// Reject the next `n` terminal updates as if the disk were full.
    pub fn failing_terminal_writes(n: usize) -> Self {
        Self {
            terminal_failures: AtomicUsize::new(n),
            ..Default::default()
        }
    }

    pub fn progress_history(&self, id: &JobId) -> Vec<u8> {
        self.history
            .lock()
            .expect("history lock")
            .iter()
            .filter(|(job_id, _, _)| job_id == id)
            .map(|(_, _, progress)| *progress)
            .collect()
    }

    pub fn stage_history(&self, id: &JobId) -> Vec<ExportStage> {
        let mut stages: Vec<ExportStage> = Vec::new();
        for (job_id, stage, _) in self.history.lock().expect("history lock").iter() {
            if job_id == id && stages.last() != Some(stage) {
                stages.push(*stage);
            }
        }
        stages
    }
}

#[async_trait]
impl JobStore for RecordingStore {
    async fn create(&self, job: ExportJob) -> StoreResult<ExportJob> {
        self.inner.create(job).await
    }

    async fn query(&self, filter: &JobFilter) -> StoreResult<Vec<ExportJob>> {
        self.inner.query(filter).await
    }

    async fn update(&self, id: &JobId, update: &JobUpdate) -> StoreResult<ExportJob> {
        let terminal = update.stage.is_some_and(|s| s.is_terminal());
        if terminal
            && self
                .terminal_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(StoreError::Io(std::io::Error::other("no space left on device")));
        }

        let job = self.inner.update(id, update).await?;
        self.history
            .lock()
            .expect("history lock")
            .push((job.id.clone(), job.stage, job.progress));
        Ok(job)
    }

    async fn get(&self, id: &JobId) -> StoreResult<ExportJob> {
        self.inner.get(id).await
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub config: ExportConfig,
    pub store: Arc<RecordingStore>,
    pub invoker: Arc<FakeInvoker>,
    pub provisioner: Arc<EncoderProvisioner>,
    pub controller: JobController,
    pub report: RecoveryReport,
}

pub struct HarnessBuilder {
    invoker: FakeInvoker,
    store: RecordingStore,
    max_concurrent: usize,
    encoder_missing: bool,
    bundled_encoder: bool,
    shutdown_timeout: Duration,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            invoker: FakeInvoker::default(),
            store: RecordingStore::default(),
            max_concurrent: 2,
            encoder_missing: false,
            bundled_encoder: false,
            shutdown_timeout: Duration::from_secs(5),
        }
    }

    pub fn invoker(mut self, invoker: FakeInvoker) -> Self {
        self.invoker = invoker;
        self
    }

    pub fn store(mut self, store: RecordingStore) -> Self {
        self.store = store;
        self
    }

    pub fn max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = n;
        self
    }

    pub fn encoder_missing(mut self) -> Self {
        self.encoder_missing = true;
        self
    }

    /// Install the encoder from bundled bytes instead of using a fixed path.
    pub fn bundled_encoder(mut self) -> Self {
        self.bundled_encoder = true;
        self
    }

    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub async fn boot(self) -> Harness {
        let dir = tempfile::tempdir().expect("tempdir");

        let clips = dir.path().join("clips");
        std::fs::create_dir_all(&clips).expect("clips dir");
        for name in ["a.mp4", "b.mp4"] {
            std::fs::write(clips.join(name), b"source video").expect("write clip");
        }

        let encoder = dir.path().join("bin").join("ffmpeg");
        if !self.encoder_missing {
            std::fs::create_dir_all(encoder.parent().expect("bin dir")).expect("bin dir");
            std::fs::write(&encoder, b"#!/bin/sh\n").expect("write encoder");
        }

        let config = ExportConfig {
            max_concurrent_exports: self.max_concurrent,
            work_dir: dir.path().join("work"),
            output_dir: dir.path().join("exports"),
            shutdown_timeout: self.shutdown_timeout,
            ..Default::default()
        };

        let source = if self.bundled_encoder {
            EncoderSource::Bundled {
                bytes: Cow::Borrowed(b"#!/bin/sh\nexit 0\n"),
                file_name: "ffmpeg".to_string(),
            }
        } else {
            EncoderSource::Path(encoder)
        };
        let provisioner = Arc::new(EncoderProvisioner::new(source, dir.path().join("install")));

        let store = Arc::new(self.store);
        let invoker = Arc::new(self.invoker);
        let deps = ControllerDeps {
            store: store.clone(),
            catalog: Arc::new(InMemoryProjectCatalog::new([PROJECT])),
            provisioner: provisioner.clone(),
            invoker: invoker.clone(),
        };

        let (controller, report) = JobController::boot(&config, deps)
            .await
            .expect("controller boot");

        Harness {
            dir,
            config,
            store,
            invoker,
            provisioner,
            controller,
            report,
        }
    }
}

impl Harness {
    pub fn clip(&self, name: &str) -> PathBuf {
        self.dir.path().join("clips").join(name)
    }

    pub fn work_dir(&self, id: &JobId) -> PathBuf {
        self.config.work_dir.join(id.as_str())
    }

    pub fn delivery_dir(&self, id: &JobId) -> PathBuf {
        self.config.output_dir.join(PROJECT).join(id.as_str())
    }

    /// Poll until the job record is terminal.
    pub async fn wait_terminal(&self, id: &JobId) -> ExportJob {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let job = self
                    .controller
                    .get_export_progress(id)
                    .await
                    .expect("job record");
                if job.is_complete {
                    return job;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("job did not reach a terminal stage")
    }

    /// Poll until no job is registered as running.
    pub async fn wait_idle(&self) {
        tokio::time::timeout(Duration::from_secs(10), async {
            while !self.controller.active_jobs().await.is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("jobs still registered")
    }

    /// Poll until the fake encoder has been called `n` times.
    pub async fn wait_calls(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(10), async {
            while self.invoker.calls() < n {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("encoder was not called")
    }
}
