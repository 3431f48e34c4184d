//! Metrics collection and exposition.
//!
//! # Metrics
//! - `herald_fetch_total` (counter): check cycles by plugin, outcome
//! - `herald_fetch_duration_seconds` (histogram): fetch latency by plugin
//! - `herald_metric_value` (gauge): last extracted threshold metric
//! - `herald_probes_total` (counter): answered probes by plugin, stale
//! - `herald_probe_write_errors_total` (counter): failed probe writes by plugin
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade and costs nothing until
//!   an exporter is installed
//! - The Prometheus exporter serves its own HTTP listener

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus exporter and describe every metric.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    metrics::describe_counter!("herald_fetch_total", "Check cycles by outcome");
    metrics::describe_histogram!(
        "herald_fetch_duration_seconds",
        metrics::Unit::Seconds,
        "Time spent fetching payloads"
    );
    metrics::describe_gauge!("herald_metric_value", "Last extracted threshold metric");
    metrics::describe_counter!("herald_probes_total", "Probe connections answered");
    metrics::describe_counter!("herald_probe_write_errors_total", "Probe connections that could not be answered");

    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

/// Record the outcome of one check cycle.
pub fn record_fetch(plugin: &str, outcome: &'static str, elapsed: Duration) {
    metrics::counter!("herald_fetch_total", "plugin" => plugin.to_string(), "outcome" => outcome).increment(1);
    metrics::histogram!("herald_fetch_duration_seconds", "plugin" => plugin.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn record_metric_value(plugin: &str, value: f64) {
    metrics::gauge!("herald_metric_value", "plugin" => plugin.to_string()).set(value);
}

pub fn record_probe(plugin: &str, stale: bool) {
    let stale = if stale { "true" } else { "false" };
    metrics::counter!("herald_probes_total", "plugin" => plugin.to_string(), "stale" => stale).increment(1);
}

pub fn record_probe_write_error(plugin: &str) {
    metrics::counter!("herald_probe_write_errors_total", "plugin" => plugin.to_string()).increment(1);
}
