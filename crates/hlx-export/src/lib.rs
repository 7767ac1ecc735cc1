//! Highlight export service.
//!
//! This crate provides:
//! - [`JobController`]: start, cancel, progress and listing of export jobs
//! - [`ExportPipeline`]: probe, plan, encode and deliver one job
//! - [`RecoveryManager`]: boot-time sweep of jobs interrupted by a restart
//! - The NDJSON command protocol served by the `hlx-exporter` binary

pub mod config;
pub mod controller;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod protocol;
pub mod recovery;
pub mod reporter;

pub use config::ExportConfig;
pub use controller::{ControllerDeps, JobController};
pub use error::{ExportError, ExportResult};
pub use logging::JobLogger;
pub use pipeline::{plan_units, ExportPipeline, PipelineOutcome};
pub use protocol::{dispatch, handle_line, parse_command, Command, Response};
pub use recovery::{RecoveryManager, RecoveryReport};
pub use reporter::JobReporter;
