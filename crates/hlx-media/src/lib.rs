//! FFmpeg CLI wrapper for highlight exports.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - A runner with stderr capture, progress parsing and cancellation
//! - Single-flight encoder provisioning
//! - The [`EncoderInvoker`] seam used by the export pipeline
//! - Source checks and output delivery helpers

pub mod command;
pub mod error;
pub mod fs_utils;
pub mod invoker;
pub mod probe;
pub mod progress;
pub mod provision;

pub use command::{check_ffmpeg, wait_for_cancel, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use fs_utils::{move_file, remove_if_exists, verify_output};
pub use invoker::{concat_list, concat_list_path, EncodeUnit, EncoderInvoker, FfmpegInvoker};
pub use probe::check_source;
pub use progress::{FfmpegProgress, ProgressCallback};
pub use provision::{EncoderProvisioner, EncoderSource};
