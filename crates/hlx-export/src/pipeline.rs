//! Export pipeline.
//!
//! A run walks one job through probing, planning, encoding and delivery.
//! Every encoder invocation goes through [`EncoderInvoker`], and every
//! non-terminal state change is pushed through a [`JobReporter`]. The
//! terminal record is left to the caller, which receives a
//! [`PipelineOutcome`].

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::fs;
use tokio::sync::watch;
use tracing::Instrument;

use hlx_media::{
    check_source, move_file, remove_if_exists, verify_output, EncodeUnit, EncoderInvoker,
    EncoderProvisioner, MediaError,
};
use hlx_models::{
    ExportJob, ExportKind, ExportStage, Highlight, JobId, JobUpdate, ProjectId, TimeRange,
    OUTPUT_EXTENSION,
};

use crate::error::{ExportError, ExportResult};
use crate::logging::JobLogger;
use crate::metrics::record_encode_unit;
use crate::reporter::JobReporter;

/// File stem of the joined output of a stitched export.
pub const STITCHED_FILE_STEM: &str = "stitched";

/// How a pipeline run ended.
#[derive(Debug)]
pub enum PipelineOutcome {
    Completed {
        output_paths: Vec<PathBuf>,
    },
    Cancelled {
        output_paths: Vec<PathBuf>,
    },
    Failed {
        error: ExportError,
        output_paths: Vec<PathBuf>,
    },
}

impl PipelineOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            PipelineOutcome::Completed { .. } => ExportStage::Completed.as_str(),
            PipelineOutcome::Cancelled { .. } => ExportStage::Cancelled.as_str(),
            PipelineOutcome::Failed { .. } => ExportStage::Failed.as_str(),
        }
    }

    pub fn output_paths(&self) -> &[PathBuf] {
        match self {
            PipelineOutcome::Completed { output_paths }
            | PipelineOutcome::Cancelled { output_paths }
            | PipelineOutcome::Failed { output_paths, .. } => output_paths,
        }
    }

    /// Terminal update recording this outcome.
    pub fn into_update(self) -> JobUpdate {
        match self {
            PipelineOutcome::Completed { output_paths } => JobUpdate::completed(output_paths),
            PipelineOutcome::Cancelled { output_paths } => JobUpdate::cancelled(output_paths),
            PipelineOutcome::Failed {
                error,
                output_paths,
            } => JobUpdate::failed(error.kind(), error.diagnostic(), output_paths),
        }
    }
}

/// Drives the encoder for one job at a time.
pub struct ExportPipeline {
    provisioner: Arc<EncoderProvisioner>,
    invoker: Arc<dyn EncoderInvoker>,
    work_root: PathBuf,
    output_root: PathBuf,
}

impl ExportPipeline {
    pub fn new(
        provisioner: Arc<EncoderProvisioner>,
        invoker: Arc<dyn EncoderInvoker>,
        work_root: impl Into<PathBuf>,
        output_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            provisioner,
            invoker,
            work_root: work_root.into(),
            output_root: output_root.into(),
        }
    }

    /// Directory units of `job_id` write into before delivery.
    pub fn work_dir(&self, job_id: &JobId) -> PathBuf {
        self.work_root.join(job_id.as_str())
    }

    /// Directory delivered outputs of a job end up in.
    pub fn delivery_dir(&self, project_id: &ProjectId, job_id: &JobId) -> PathBuf {
        self.output_root.join(project_id.as_str()).join(job_id.as_str())
    }

    /// Run `job` to an outcome. Never panics and never writes a terminal record.
    pub async fn run(
        &self,
        job: &ExportJob,
        reporter: &JobReporter,
        cancel: watch::Receiver<bool>,
    ) -> PipelineOutcome {
        let logger = JobLogger::new(&job.id, &job.project_id, job.kind);
        logger.log_start(&format!("{} highlights", job.highlights.len()));

        let mut produced = Vec::new();
        let result = self
            .execute(job, reporter, &logger, &cancel, &mut produced)
            .instrument(logger.create_span())
            .await;

        match result {
            Ok(()) => {
                logger.log_completion(&format!("{} files delivered", produced.len()));
                PipelineOutcome::Completed {
                    output_paths: produced,
                }
            }
            Err(e) if e.is_cancelled() => {
                logger.log_warning(&format!(
                    "cancelled with {} completed outputs",
                    produced.len()
                ));
                PipelineOutcome::Cancelled {
                    output_paths: produced,
                }
            }
            Err(e) => {
                logger.log_error(&e.diagnostic());
                PipelineOutcome::Failed {
                    error: e,
                    output_paths: produced,
                }
            }
        }
    }

    async fn execute(
        &self,
        job: &ExportJob,
        reporter: &JobReporter,
        logger: &JobLogger,
        cancel: &watch::Receiver<bool>,
        produced: &mut Vec<PathBuf>,
    ) -> ExportResult<()> {
        ensure_not_cancelled(cancel)?;

        // Probing
        reporter.report(JobUpdate::stage(ExportStage::Probing)).await;
        let encoder = self.provisioner.resolve().await?;
        for source in distinct_sources(&job.highlights) {
            check_source(source).await?;
        }
        ensure_not_cancelled(cancel)?;

        // Preparing
        let work_dir = self.work_dir(&job.id);
        let units = plan_units(job.kind, &job.highlights, &work_dir)?;
        let total = units.len() as u32;
        fs::create_dir_all(&work_dir).await.map_err(MediaError::from)?;
        reporter
            .report(JobUpdate::stage(ExportStage::Preparing).with_units_total(total))
            .await;
        logger.log_progress(&format!("planned {} encoder units", total));
        ensure_not_cancelled(cancel)?;

        // Encoding
        reporter.report(JobUpdate::stage(ExportStage::Encoding)).await;
        for (idx, unit) in units.iter().enumerate() {
            ensure_not_cancelled(cancel)?;

            let started = Instant::now();
            let result = match self.invoker.invoke(&encoder, unit, cancel.clone()).await {
                Ok(()) => verify_output(unit.output()).await.map(|_| ()),
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                discard_partial(unit.output(), logger).await;
                return Err(e.into());
            }

            record_encode_unit(
                if unit.is_concat() { "concat" } else { "extract" },
                started.elapsed().as_secs_f64(),
            );
            produced.push(unit.output().to_path_buf());
            reporter
                .report(JobUpdate::unit_done(idx as u32 + 1, total, produced.clone()))
                .await;
            logger.log_progress(&format!("unit {}/{} done: {}", idx + 1, total, unit));
        }
        ensure_not_cancelled(cancel)?;

        // Finalizing
        reporter.report(JobUpdate::stage(ExportStage::Finalizing)).await;
        self.finalize(job, &work_dir, produced, logger, cancel).await
    }

    /// Move outputs into the delivery directory, rewriting `produced` as
    /// files move so a failure or cancel part-way still reports where they are.
    async fn finalize(
        &self,
        job: &ExportJob,
        work_dir: &Path,
        produced: &mut Vec<PathBuf>,
        logger: &JobLogger,
        cancel: &watch::Receiver<bool>,
    ) -> ExportResult<()> {
        if job.kind == ExportKind::Stitched {
            if let Some(stitched) = produced.pop() {
                let segments = std::mem::replace(produced, vec![stitched]);
                for segment in &segments {
                    if let Err(e) = remove_if_exists(segment).await {
                        logger.log_warning(&format!(
                            "failed to remove segment {}: {}",
                            segment.display(),
                            e
                        ));
                    }
                }
            }
        }

        let delivery = self.delivery_dir(&job.project_id, &job.id);
        fs::create_dir_all(&delivery).await.map_err(MediaError::from)?;

        for path in produced.iter_mut() {
            ensure_not_cancelled(cancel)?;
            let dst = match path.file_name() {
                Some(name) => delivery.join(name),
                None => return Err(MediaError::InvalidOutput(path.clone()).into()),
            };
            move_file(&*path, &dst).await?;
            *path = dst;
            verify_output(&*path).await?;
        }

        match fs::remove_dir_all(work_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => logger.log_warning(&format!(
                "failed to remove work dir {}: {}",
                work_dir.display(),
                e
            )),
        }

        Ok(())
    }
}

fn ensure_not_cancelled(cancel: &watch::Receiver<bool>) -> ExportResult<()> {
    if *cancel.borrow() {
        return Err(MediaError::Cancelled.into());
    }
    Ok(())
}

async fn discard_partial(path: &Path, logger: &JobLogger) {
    match remove_if_exists(path).await {
        Ok(true) => logger.log_progress(&format!("removed partial output {}", path.display())),
        Ok(false) => {}
        Err(e) => logger.log_warning(&format!(
            "failed to remove partial output {}: {}",
            path.display(),
            e
        )),
    }
}

fn distinct_sources(highlights: &[Highlight]) -> Vec<&Path> {
    let mut seen = HashSet::new();
    highlights
        .iter()
        .map(|h| h.source.as_path())
        .filter(|p| seen.insert(*p))
        .collect()
}

/// Plan the encoder invocations for a selection.
///
/// Individual exports get one extract per highlight. Stitched exports
/// extract the minimal segment list and join it with a single concat.
pub fn plan_units(
    kind: ExportKind,
    highlights: &[Highlight],
    work_dir: &Path,
) -> ExportResult<Vec<EncodeUnit>> {
    if highlights.is_empty() {
        return Err(ExportError::validation("No highlights to export"));
    }

    let ranges = highlights
        .iter()
        .enumerate()
        .map(|(idx, h)| {
            h.range()
                .map_err(|e| ExportError::validation(format!("Highlight {}: {}", idx + 1, e)))
        })
        .collect::<ExportResult<Vec<_>>>()?;

    let units = match kind {
        ExportKind::Individual => highlights
            .iter()
            .zip(ranges)
            .enumerate()
            .map(|(idx, (h, range))| EncodeUnit::Extract {
                source: h.source.clone(),
                range,
                output: work_dir.join(individual_file_name(idx, h)),
            })
            .collect(),
        ExportKind::Stitched => {
            let segments = coalesce_segments(highlights.iter().map(|h| h.source.as_path()).zip(ranges));
            let mut units: Vec<EncodeUnit> = segments
                .into_iter()
                .enumerate()
                .map(|(idx, (source, range))| EncodeUnit::Extract {
                    source,
                    range,
                    output: work_dir.join(output_file_name(&format!("segment_{:02}", idx + 1))),
                })
                .collect();
            let inputs = units.iter().map(|u| u.output().to_path_buf()).collect();
            units.push(EncodeUnit::Concat {
                inputs,
                output: work_dir.join(output_file_name(STITCHED_FILE_STEM)),
            });
            units
        }
    };

    Ok(units)
}

fn output_file_name(stem: &str) -> String {
    format!("{}.{}", stem, OUTPUT_EXTENSION)
}

/// `highlight_<NN>[_<slug>].mp4`, numbered from 1.
fn individual_file_name(idx: usize, highlight: &Highlight) -> String {
    match highlight.slug() {
        Some(slug) => output_file_name(&format!("highlight_{:02}_{}", idx + 1, slug)),
        None => output_file_name(&format!("highlight_{:02}", idx + 1)),
    }
}

/// Merge consecutive ranges of the same source that overlap or touch.
fn coalesce_segments<'a>(
    ranges: impl IntoIterator<Item = (&'a Path, TimeRange)>,
) -> Vec<(PathBuf, TimeRange)> {
    let mut segments: Vec<(PathBuf, TimeRange)> = Vec::new();
    for (source, range) in ranges {
        match segments.last_mut() {
            Some((last_source, last)) if last_source.as_path() == source && last.touches(&range) => {
                *last = last.union(&range);
            }
            _ => segments.push((source.to_path_buf(), range)),
        }
    }
    segments
}
