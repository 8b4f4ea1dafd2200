//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define bus, lifecycle and shutdown metrics
//! - Optionally expose a Prometheus-compatible scrape endpoint
//!
//! # Metrics
//! - `tui_bus_messages_published_total` (counter): accepted messages
//! - `tui_bus_messages_processed_total` (counter): delivered messages
//! - `tui_bus_messages_dropped_total` (counter): overflow and TTL drops, by reason
//! - `tui_bus_handler_errors_total` (counter): failed or panicked handlers
//! - `tui_bus_queue_depth` (gauge): messages waiting for delivery
//! - `tui_bus_delivery_duration_seconds` (histogram): per-message fan-out time
//! - `tui_lifecycle_phase` (gauge): 0=stopped 1=initializing 2=running 3=shutting-down
//! - `tui_shutdown_steps_total` (counter): step outcomes, by status
//! - `tui_shutdown_duration_seconds` (histogram): full shutdown runs
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - The exporter is opt-in since the terminal is owned by the UI

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::lifecycle::Phase;

/// Install the Prometheus recorder with an HTTP scrape listener.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_message_published(queue_depth: usize) {
    metrics::counter!("tui_bus_messages_published_total").increment(1);
    metrics::gauge!("tui_bus_queue_depth").set(queue_depth as f64);
}

pub fn record_message_processed(elapsed: Duration, queue_depth: usize) {
    metrics::counter!("tui_bus_messages_processed_total").increment(1);
    metrics::histogram!("tui_bus_delivery_duration_seconds").record(elapsed.as_secs_f64());
    metrics::gauge!("tui_bus_queue_depth").set(queue_depth as f64);
}

pub fn record_message_dropped(reason: &'static str) {
    metrics::counter!("tui_bus_messages_dropped_total", "reason" => reason).increment(1);
}

pub fn record_handler_error(subscriber: &str) {
    metrics::counter!("tui_bus_handler_errors_total", "subscriber" => subscriber.to_string())
        .increment(1);
}

pub fn record_phase(phase: Phase) {
    let value = match phase {
        Phase::Stopped => 0.0,
        Phase::Initializing => 1.0,
        Phase::Running => 2.0,
        Phase::ShuttingDown => 3.0,
    };
    metrics::gauge!("tui_lifecycle_phase").set(value);
}

pub fn record_shutdown_step(status: &'static str, elapsed: Duration) {
    metrics::counter!("tui_shutdown_steps_total", "status" => status).increment(1);
    metrics::histogram!("tui_shutdown_step_duration_seconds", "status" => status)
        .record(elapsed.as_secs_f64());
}

pub fn record_shutdown_complete(elapsed: Duration, forced: bool) {
    let forced = if forced { "true" } else { "false" };
    metrics::histogram!("tui_shutdown_duration_seconds", "forced" => forced)
        .record(elapsed.as_secs_f64());
}
