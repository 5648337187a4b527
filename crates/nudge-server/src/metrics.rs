//! Prometheus metrics recorder and `/metrics` rendering.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

pub use nudge_core::dispatcher::{
    BACKLOG_OVERFLOW_TOTAL, PUSH_TOTAL, STREAM_CONNECTIONS_ACTIVE, STREAM_CONNECTIONS_TOTAL,
};

/// Sessions evicted by the idle sweeper (counter).
pub const SESSIONS_EVICTED_TOTAL: &str = "sessions_evicted_total";
/// Push requests rejected at the HTTP boundary (counter, labels: code).
pub const TRIGGER_REJECTED_TOTAL: &str = "trigger_rejected_total";

/// Install the Prometheus recorder as the global `metrics` recorder.
///
/// Call once at startup, before anything records.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// A handle backed by a recorder that is not installed globally.
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

/// Render Prometheus text format.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}
