//! Pipeline runs driven directly, without the controller.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use common::FakeInvoker;
use hlx_export::{ExportPipeline, JobReporter, PipelineOutcome};
use hlx_media::{EncoderProvisioner, EncoderSource};
use hlx_models::{ExportJob, ExportKind, ExportStage, Highlight, JobId, JobUpdate, ProjectId};
use hlx_store::{InMemoryJobStore, JobFilter, JobStore, StoreResult};

/// Store that raises the cancel flag once the given stage is reported.
struct CancelOnStage {
    inner: InMemoryJobStore,
    stage: ExportStage,
    cancel: watch::Sender<bool>,
}

#[async_trait]
impl JobStore for CancelOnStage {
    async fn create(&self, job: ExportJob) -> StoreResult<ExportJob> {
        self.inner.create(job).await
    }

    async fn query(&self, filter: &JobFilter) -> StoreResult<Vec<ExportJob>> {
        self.inner.query(filter).await
    }

    async fn update(&self, id: &JobId, update: &JobUpdate) -> StoreResult<ExportJob> {
        if update.stage == Some(self.stage) {
            let _ = self.cancel.send(true);
        }
        self.inner.update(id, update).await
    }

    async fn get(&self, id: &JobId) -> StoreResult<ExportJob> {
        self.inner.get(id).await
    }
}

#[tokio::test]
async fn test_cancel_during_finalizing_stops_delivery() {
    let dir = tempfile::tempdir().expect("tempdir");
    let clip = dir.path().join("a.mp4");
    std::fs::write(&clip, b"source video").expect("write clip");
    let encoder = dir.path().join("ffmpeg");
    std::fs::write(&encoder, b"#!/bin/sh\n").expect("write encoder");

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let store = Arc::new(CancelOnStage {
        inner: InMemoryJobStore::new(),
        stage: ExportStage::Finalizing,
        cancel: cancel_tx,
    });
    let job = store
        .create(ExportJob::new(
            ProjectId::new("7"),
            ExportKind::Individual,
            vec![
                Highlight::new(&clip, "0", "5"),
                Highlight::new(&clip, "10", "15"),
            ],
        ))
        .await
        .expect("create");

    let pipeline = ExportPipeline::new(
        Arc::new(EncoderProvisioner::new(
            EncoderSource::Path(encoder),
            dir.path().join("install"),
        )),
        Arc::new(FakeInvoker::default()),
        dir.path().join("work"),
        dir.path().join("exports"),
    );
    let reporter = JobReporter::new(store.clone(), job.id.clone());

    let outcome = pipeline.run(&job, &reporter, cancel_rx).await;

    let PipelineOutcome::Cancelled { output_paths } = outcome else {
        panic!("expected a cancelled outcome, got {:?}", outcome);
    };
    let work_dir = pipeline.work_dir(&job.id);
    assert_eq!(
        output_paths,
        vec![work_dir.join("highlight_01.mp4"), work_dir.join("highlight_02.mp4")]
    );
    for path in &output_paths {
        assert!(path.exists(), "{} missing", path.display());
    }
    let delivery = pipeline.delivery_dir(&job.project_id, &job.id);
    assert!(!delivery.join("highlight_01.mp4").exists());
}
