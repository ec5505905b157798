//! Prometheus metrics for flowcanvas.
//!
//! ## Metrics
//!
//! ### Counters
//! - `flowcanvas_workflows_executed_total` - Workflow runs by terminal status and mode
//! - `flowcanvas_node_jobs_total` - Generator jobs by kind and status
//! - `flowcanvas_poll_attempts_total` - Status polls issued, by kind
//!
//! ### Histograms
//! - `flowcanvas_workflow_duration_seconds` - Workflow run duration
//! - `flowcanvas_job_duration_seconds` - Generator job duration by kind
//!
//! ### Gauges
//! - `flowcanvas_active_executions` - Currently running workflow executions

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::warn;

static PROMETHEUS_HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Install the Prometheus recorder.
///
/// Safe to call more than once; only the first call installs. Returns `None`
/// when another recorder already owns the global slot.
pub fn init_metrics() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Failed to install Prometheus recorder: {}", e);
                None
            }
        })
        .clone()
}

/// Render current metrics in Prometheus text format.
pub fn render_metrics() -> String {
    match PROMETHEUS_HANDLE.get().and_then(|h| h.as_ref()) {
        Some(handle) => handle.render(),
        None => "# Metrics not initialized\n".to_string(),
    }
}

// =============================================================================
// Workflow Metrics
// =============================================================================

pub fn record_workflow_execution(status: &str, mode: &str) {
    counter!(
        "flowcanvas_workflows_executed_total",
        "status" => status.to_string(),
        "mode" => mode.to_string()
    )
    .increment(1);
}

pub fn record_workflow_duration(duration: Duration) {
    histogram!("flowcanvas_workflow_duration_seconds").record(duration.as_secs_f64());
}

pub fn inc_active_executions() {
    gauge!("flowcanvas_active_executions").increment(1.0);
}

pub fn dec_active_executions() {
    gauge!("flowcanvas_active_executions").decrement(1.0);
}

// =============================================================================
// Job Metrics
// =============================================================================

/// Record a finished generator job.
pub fn record_node_job(kind: &str, status: &str) {
    counter!(
        "flowcanvas_node_jobs_total",
        "kind" => kind.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_job_duration(duration: Duration, kind: &str) {
    histogram!(
        "flowcanvas_job_duration_seconds",
        "kind" => kind.to_string()
    )
    .record(duration.as_secs_f64());
}

pub fn record_poll_attempt(kind: &str) {
    counter!(
        "flowcanvas_poll_attempts_total",
        "kind" => kind.to_string()
    )
    .increment(1);
}
