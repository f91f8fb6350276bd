//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define lifecycle metrics (component starts/exits, shutdown latency, job runs)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `apphost_component_starts_total` (counter): by component
//! - `apphost_component_exits_total` (counter): by component, result
//! - `apphost_shutdown_duration_seconds` (histogram): by component, result
//! - `apphost_job_runs_total` (counter): by job, result
//! - `apphost_job_duration_seconds` (histogram): by job
//! - `apphost_jobs_abandoned_total` (counter)
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Exporter failures are logged, never fatal

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with an HTTP listener on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_component_start(component: &str) {
    counter!("apphost_component_starts_total", "component" => component.to_string()).increment(1);
}

pub fn record_component_exit(component: &str, ok: bool) {
    counter!(
        "apphost_component_exits_total",
        "component" => component.to_string(),
        "result" => result_label(ok)
    )
    .increment(1);
}

pub fn record_shutdown(component: &str, result: &'static str, elapsed: Duration) {
    histogram!(
        "apphost_shutdown_duration_seconds",
        "component" => component.to_string(),
        "result" => result
    )
    .record(elapsed.as_secs_f64());
}

pub fn record_job_run(job: &str, ok: bool, elapsed: Duration) {
    counter!("apphost_job_runs_total", "job" => job.to_string(), "result" => result_label(ok)).increment(1);
    histogram!("apphost_job_duration_seconds", "job" => job.to_string()).record(elapsed.as_secs_f64());
}

pub fn record_jobs_abandoned(count: usize) {
    counter!("apphost_jobs_abandoned_total").increment(count as u64);
}

fn result_label(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "error"
    }
}
