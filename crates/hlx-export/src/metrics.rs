//! Prometheus metrics for the export service.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Metric names as constants for consistency.
pub mod names {
    pub const EXPORTS_STARTED_TOTAL: &str = "hlx_exports_started_total";
    pub const EXPORTS_FINISHED_TOTAL: &str = "hlx_exports_finished_total";
    pub const JOBS_RECOVERED_TOTAL: &str = "hlx_jobs_recovered_total";
    pub const ENCODE_UNIT_DURATION_SECONDS: &str = "hlx_encode_unit_duration_seconds";
}

/// Install the Prometheus recorder and serve it over HTTP on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn install_exporter(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()
}

pub fn record_export_started(kind: &str) {
    counter!(names::EXPORTS_STARTED_TOTAL, "kind" => kind.to_string()).increment(1);
}

pub fn record_export_finished(outcome: &'static str) {
    counter!(names::EXPORTS_FINISHED_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_jobs_recovered(count: usize) {
    counter!(names::JOBS_RECOVERED_TOTAL).increment(count as u64);
}

pub fn record_encode_unit(unit: &'static str, duration_secs: f64) {
    histogram!(names::ENCODE_UNIT_DURATION_SECONDS, "unit" => unit).record(duration_secs);
}
