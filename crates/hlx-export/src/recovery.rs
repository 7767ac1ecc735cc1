//! Boot-time recovery of jobs orphaned by a restart.
//!
//! No encoder process survives a restart, so any record that is still
//! active at boot can never finish. Each one is moved to a terminal
//! cancelled state with a restart cause. Output files are left as-is.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use hlx_models::JobUpdate;
use hlx_store::{JobFilter, JobStore, StoreResult};

use crate::metrics::record_jobs_recovered;

/// Counts from one recovery sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// Active records found
    pub scanned: usize,
    /// Records moved to the restart-cancelled state
    pub recovered: usize,
    /// Records whose update failed
    pub failed: usize,
}

pub struct RecoveryManager {
    store: Arc<dyn JobStore>,
}

impl RecoveryManager {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Sweep all active records once.
    ///
    /// Only the initial query can fail the sweep. A failed update is logged
    /// and counted, and the sweep moves on to the next record. Running it
    /// again finds nothing left to do.
    pub async fn run(&self) -> StoreResult<RecoveryReport> {
        let orphaned = self.store.query(&JobFilter::active()).await?;
        let mut report = RecoveryReport {
            scanned: orphaned.len(),
            ..Default::default()
        };

        if orphaned.is_empty() {
            info!("No interrupted export jobs found");
            return Ok(report);
        }

        let update = JobUpdate::restart_interrupted();
        for job in orphaned {
            warn!(
                job_id = %job.id,
                project_id = %job.project_id,
                stage = %job.stage,
                progress = job.progress,
                "Export job was interrupted by a restart"
            );

            match self.store.update(&job.id, &update).await {
                Ok(_) => report.recovered += 1,
                Err(e) => {
                    report.failed += 1;
                    error!(job_id = %job.id, "Failed to recover interrupted job: {}", e);
                }
            }
        }

        record_jobs_recovered(report.recovered);
        info!(
            "Recovery complete: {} scanned, {} recovered, {} failed",
            report.scanned, report.recovered, report.failed
        );
        Ok(report)
    }
}
