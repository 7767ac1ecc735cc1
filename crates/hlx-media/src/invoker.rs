//! Encoder invocation units and the invoker seam.
//!
//! A unit is one encoder process: either extracting a bounded range of a
//! source clip, or concatenating previously extracted segments. The pipeline
//! only talks to [`EncoderInvoker`], so it can be driven by a fake in tests.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::debug;

use hlx_models::{EncodingConfig, TimeRange};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::fs_utils::remove_if_exists;

/// One planned encoder invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum EncodeUnit {
    /// Re-encode `range` of `source` into `output`.
    Extract {
        source: PathBuf,
        range: TimeRange,
        output: PathBuf,
    },
    /// Join `inputs`, in order, into `output` without re-encoding.
    Concat { inputs: Vec<PathBuf>, output: PathBuf },
}

impl EncodeUnit {
    /// File this unit writes.
    pub fn output(&self) -> &Path {
        match self {
            EncodeUnit::Extract { output, .. } | EncodeUnit::Concat { output, .. } => output,
        }
    }

    pub fn is_concat(&self) -> bool {
        matches!(self, EncodeUnit::Concat { .. })
    }
}

impl fmt::Display for EncodeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeUnit::Extract { source, range, .. } => write!(
                f,
                "extract {} [{:.3}s-{:.3}s]",
                source.display(),
                range.start_secs,
                range.end_secs
            ),
            EncodeUnit::Concat { inputs, .. } => write!(f, "concat {} segments", inputs.len()),
        }
    }
}

/// Runs a single encoder invocation.
///
/// Implementations must stop the in-flight process and return
/// [`MediaError::Cancelled`](crate::MediaError::Cancelled) once `cancel`
/// flips to `true`.
#[async_trait]
pub trait EncoderInvoker: Send + Sync {
    async fn invoke(
        &self,
        encoder: &Path,
        unit: &EncodeUnit,
        cancel: watch::Receiver<bool>,
    ) -> MediaResult<()>;
}

/// [`EncoderInvoker`] that shells out to an FFmpeg-compatible binary.
#[derive(Debug, Clone, Default)]
pub struct FfmpegInvoker {
    encoding: EncodingConfig,
    timeout_secs: Option<u64>,
}

impl FfmpegInvoker {
    pub fn new(encoding: EncodingConfig) -> Self {
        Self {
            encoding,
            timeout_secs: None,
        }
    }

    /// Kill any single invocation running longer than `secs`.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Build the command for a unit.
    ///
    /// Concat units read their inputs from a list file, which the caller must
    /// write to [`concat_list_path`] first.
    pub fn build_command(&self, unit: &EncodeUnit) -> FfmpegCommand {
        match unit {
            EncodeUnit::Extract {
                source,
                range,
                output,
            } => FfmpegCommand::new(source, output)
                .seek(range.start_secs)
                .duration(range.duration())
                .output_args(self.encoding.to_output_args())
                .faststart(),
            EncodeUnit::Concat { output, .. } => {
                FfmpegCommand::new(concat_list_path(output), output)
                    .concat_demuxer()
                    .codec_copy()
                    .faststart()
            }
        }
    }

    fn runner(
        &self,
        encoder: &Path,
        unit: &EncodeUnit,
        cancel: watch::Receiver<bool>,
    ) -> FfmpegRunner {
        let mut runner = FfmpegRunner::new(encoder).with_cancel(cancel);
        if let EncodeUnit::Extract { range, output, .. } = unit {
            let total_ms = (range.duration() * 1000.0) as i64;
            let output = output.display().to_string();
            runner = runner.with_progress(Box::new(move |p| {
                debug!(
                    output = %output,
                    percent = p.percentage(total_ms),
                    speed = p.speed,
                    "Encoder progress"
                );
            }));
        }
        match self.timeout_secs {
            Some(secs) => runner.with_timeout(secs),
            None => runner,
        }
    }
}

/// Location of the concat list written for a concat unit.
pub fn concat_list_path(output: &Path) -> PathBuf {
    output.with_extension("concat.txt")
}

/// Render an FFmpeg concat-demuxer list.
///
/// The demuxer resolves relative entries against the list's own directory,
/// so every entry is written as an absolute path.
pub fn concat_list(inputs: &[PathBuf]) -> MediaResult<String> {
    let mut body = String::new();
    for path in inputs {
        let path = std::path::absolute(path)?;
        // Single quotes inside a quoted path are written as '\''
        let escaped = path.to_string_lossy().replace('\'', "'\\''");
        body.push_str("file '");
        body.push_str(&escaped);
        body.push_str("'\n");
    }
    Ok(body)
}

#[async_trait]
impl EncoderInvoker for FfmpegInvoker {
    async fn invoke(
        &self,
        encoder: &Path,
        unit: &EncodeUnit,
        cancel: watch::Receiver<bool>,
    ) -> MediaResult<()> {
        let cmd = self.build_command(unit);
        debug!("Invoking encoder for {}", unit);

        match unit {
            EncodeUnit::Extract { .. } => self.runner(encoder, unit, cancel).run(&cmd).await,
            EncodeUnit::Concat { inputs, output } => {
                let list_path = concat_list_path(output);
                tokio::fs::write(&list_path, concat_list(inputs)?).await?;

                let result = self.runner(encoder, unit, cancel).run(&cmd).await;

                if let Err(e) = remove_if_exists(&list_path).await {
                    tracing::warn!("Failed to remove concat list {}: {}", list_path.display(), e);
                }
                result
            }
        }
    }
}
