//! Metrics collection and export for the confab relay.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "confab_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "confab_connections_active";
    pub const JOINS_TOTAL: &str = "confab_joins_total";
    pub const JOIN_REJECTIONS_TOTAL: &str = "confab_join_rejections_total";
    pub const MESSAGES_RELAYED_TOTAL: &str = "confab_messages_relayed_total";
    pub const MESSAGE_BYTES: &str = "confab_message_bytes_total";
    pub const ROOMS_ACTIVE: &str = "confab_rooms_active";
    pub const FRAME_LATENCY_SECONDS: &str = "confab_frame_latency_seconds";
    pub const ERRORS_TOTAL: &str = "confab_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of active connections"
    );
    metrics::describe_counter!(names::JOINS_TOTAL, "Total number of successful room joins");
    metrics::describe_counter!(
        names::JOIN_REJECTIONS_TOTAL,
        "Total number of rejected join attempts"
    );
    metrics::describe_counter!(
        names::MESSAGES_RELAYED_TOTAL,
        "Total number of messages fanned out to room members"
    );
    metrics::describe_counter!(names::MESSAGE_BYTES, "Total bytes of relayed message bodies");
    metrics::describe_gauge!(names::ROOMS_ACTIVE, "Current number of occupied rooms");
    metrics::describe_histogram!(
        names::FRAME_LATENCY_SECONDS,
        "Inbound frame handling latency in seconds"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a successful room join.
pub fn record_join() {
    counter!(names::JOINS_TOTAL).increment(1);
}

/// Record a rejected join attempt.
pub fn record_join_rejection() {
    counter!(names::JOIN_REJECTIONS_TOTAL).increment(1);
}

/// Record a relayed message and its fan-out size.
pub fn record_relayed(body_bytes: usize, recipients: usize) {
    counter!(names::MESSAGES_RELAYED_TOTAL).increment(recipients as u64);
    counter!(names::MESSAGE_BYTES).increment((body_bytes * recipients) as u64);
}

/// Record inbound frame handling latency.
pub fn record_frame_latency(seconds: f64) {
    histogram!(names::FRAME_LATENCY_SECONDS).record(seconds);
}

/// Update the occupied-room count.
pub fn set_active_rooms(count: usize) {
    gauge!(names::ROOMS_ACTIVE).set(count as f64);
}

/// Record an error.
pub fn record_error(error_type: &str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type.to_string()).increment(1);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_guard() {
        // Just test that it doesn't panic
        let _guard = ConnectionMetricsGuard::new();
    }
}
