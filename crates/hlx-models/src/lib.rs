//! Shared data models for the highlight export service.
//!
//! This crate provides Serde-serializable types for:
//! - Export jobs, their stages and partial updates
//! - Highlight selections and export requests
//! - Timestamp parsing
//! - Encoding configuration

pub mod encoding;
pub mod highlight;
pub mod job;
pub mod timestamp;

// Re-export common types
pub use encoding::{EncodingConfig, OUTPUT_EXTENSION};
pub use highlight::{ExportRequest, Highlight};
pub use job::{
    progress_percent, AlreadyTerminal, ExportErrorKind, ExportJob, ExportKind, ExportStage, JobId,
    JobUpdate, ProjectId, RESTART_INTERRUPTED_MESSAGE,
};
pub use timestamp::{parse_range, parse_timestamp, TimeRange, TimestampError};
