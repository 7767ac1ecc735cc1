//! Boot-time recovery of interrupted jobs.

mod common;

use std::sync::Arc;

use common::{HarnessBuilder, RecordingStore, PROJECT};
use hlx_export::{ControllerDeps, ExportConfig, JobController};
use hlx_media::{EncoderProvisioner, EncoderSource, FfmpegInvoker};
use hlx_models::{
    ExportErrorKind, ExportJob, ExportKind, ExportStage, Highlight, JobUpdate, ProjectId,
    RESTART_INTERRUPTED_MESSAGE,
};
use hlx_store::{FileJobStore, InMemoryProjectCatalog, JobFilter, JobStore};

fn job_in(stage: ExportStage, progress: u8) -> ExportJob {
    let mut job = ExportJob::new(
        ProjectId::from(PROJECT),
        ExportKind::Stitched,
        vec![Highlight::new("/clips/a.mp4", "0", "5")],
    );
    let update = JobUpdate {
        stage: Some(stage),
        progress: Some(progress),
        ..Default::default()
    };
    job.apply(&update, chrono::Utc::now()).expect("apply");
    job
}

#[tokio::test]
async fn test_boot_recovers_interrupted_jobs() {
    let interrupted = job_in(ExportStage::Encoding, 40);
    let finished = job_in(ExportStage::Completed, 100);
    let h = HarnessBuilder::new()
        .store(RecordingStore::with_jobs(vec![
            interrupted.clone(),
            finished.clone(),
        ]))
        .boot()
        .await;

    assert_eq!(h.report.scanned, 1);
    assert_eq!(h.report.recovered, 1);
    assert_eq!(h.report.failed, 0);

    let job = h
        .controller
        .get_export_progress(&interrupted.id)
        .await
        .expect("record");
    assert_eq!(job.stage, ExportStage::Cancelled);
    assert!(job.is_cancelled && job.is_complete);
    assert_eq!(job.error_message.as_deref(), Some(RESTART_INTERRUPTED_MESSAGE));
    assert_eq!(job.error_kind, Some(ExportErrorKind::RestartInterrupted));
    assert_eq!(job.progress, 40, "recovery must not touch progress");
    assert_eq!(job.completed_at, Some(job.updated_at));

    assert_eq!(
        h.controller
            .get_export_progress(&finished.id)
            .await
            .expect("record"),
        finished
    );

    // A recovered job was never registered in this process.
    assert!(h.controller.active_jobs().await.is_empty());
    assert!(h.controller.cancel_export(&interrupted.id).await.is_err());
}

#[tokio::test]
async fn test_recovery_survives_restart_of_file_store() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store_path = dir.path().join("jobs.json");
    let encoder = dir.path().join("ffmpeg");
    std::fs::write(&encoder, b"bin").expect("encoder");

    let stuck = job_in(ExportStage::Finalizing, 90);
    {
        let store = FileJobStore::open(&store_path).await.expect("open");
        store.create(stuck.clone()).await.expect("create");
    }

    let config = ExportConfig {
        work_dir: dir.path().join("work"),
        output_dir: dir.path().join("exports"),
        ..Default::default()
    };

    let mut reports = Vec::new();
    for _ in 0..2 {
        let store: Arc<dyn JobStore> =
            Arc::new(FileJobStore::open(&store_path).await.expect("reopen"));
        let deps = ControllerDeps {
            store: Arc::clone(&store),
            catalog: Arc::new(InMemoryProjectCatalog::new([PROJECT])),
            provisioner: Arc::new(EncoderProvisioner::new(
                EncoderSource::Path(encoder.clone()),
                dir.path(),
            )),
            invoker: Arc::new(FfmpegInvoker::default()),
        };
        let (controller, report) = JobController::boot(&config, deps).await.expect("boot");
        reports.push(report);

        let job = controller.get_export_progress(&stuck.id).await.expect("record");
        assert_eq!(job.stage, ExportStage::Cancelled);
        assert!(store.query(&JobFilter::active()).await.expect("query").is_empty());
    }

    assert_eq!(reports[0].recovered, 1);
    assert_eq!(reports[1].scanned, 0, "second boot has nothing left to recover");
}
