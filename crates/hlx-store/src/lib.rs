//! Persistence seams for export jobs.
//!
//! This crate provides:
//! - The [`JobStore`] trait and its in-memory and JSON-file implementations
//! - The [`ProjectCatalog`] trait used to check that a project exists
//! - Filters for querying job records

pub mod catalog;
pub mod error;
pub mod file;
pub mod filter;
pub mod memory;
pub mod store;

pub use catalog::{DirectoryProjectCatalog, InMemoryProjectCatalog, ProjectCatalog};
pub use error::{StoreError, StoreResult};
pub use file::FileJobStore;
pub use filter::JobFilter;
pub use memory::InMemoryJobStore;
pub use store::JobStore;
