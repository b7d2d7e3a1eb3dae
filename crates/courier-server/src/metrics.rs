//! Metrics collection and export for Courier.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use courier_core::{FrameOutcome, HubStats};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "courier_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "courier_connections_active";
    pub const CONNECTIONS_REJECTED: &str = "courier_connections_rejected_total";
    pub const FRAMES_TOTAL: &str = "courier_frames_total";
    pub const FRAMES_BYTES: &str = "courier_frames_bytes";
    pub const HANDLER_ERRORS_TOTAL: &str = "courier_handler_errors_total";
    pub const ROOMS_ACTIVE: &str = "courier_rooms_active";
    pub const ONLINE_USERS: &str = "courier_online_users";
    pub const HEARTBEAT_TERMINATIONS: &str = "courier_heartbeat_terminations_total";
    pub const GATEWAY_EMITS: &str = "courier_gateway_emits_total";
    pub const LATENCY_SECONDS: &str = "courier_frame_latency_seconds";
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
    metrics::describe_counter!(
        names::CONNECTIONS_REJECTED,
        "Connections refused because the server was full"
    );
    metrics::describe_counter!(names::FRAMES_TOTAL, "Inbound frames by outcome");
    metrics::describe_counter!(names::FRAMES_BYTES, "Total bytes of inbound frames");
    metrics::describe_counter!(
        names::HANDLER_ERRORS_TOTAL,
        "Inbound events whose handler failed"
    );
    metrics::describe_gauge!(names::ROOMS_ACTIVE, "Current number of non-empty rooms");
    metrics::describe_gauge!(names::ONLINE_USERS, "Current number of online users");
    metrics::describe_counter!(
        names::HEARTBEAT_TERMINATIONS,
        "Connections terminated for missing a heartbeat"
    );
    metrics::describe_counter!(names::GATEWAY_EMITS, "Events injected through the gateway");
    metrics::describe_histogram!(
        names::LATENCY_SECONDS,
        "Inbound frame handling latency in seconds"
    );

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

/// Record a refused connection.
pub fn record_rejection() {
    counter!(names::CONNECTIONS_REJECTED).increment(1);
}

/// Record an inbound frame.
pub fn record_frame(bytes: usize, outcome: FrameOutcome) {
    counter!(names::FRAMES_TOTAL, "outcome" => outcome.as_str()).increment(1);
    counter!(names::FRAMES_BYTES).increment(bytes as u64);
    if outcome == FrameOutcome::Failed {
        counter!(names::HANDLER_ERRORS_TOTAL).increment(1);
    }
}

/// Record frame handling latency.
pub fn record_latency(seconds: f64) {
    histogram!(names::LATENCY_SECONDS).record(seconds);
}

/// Record heartbeat terminations.
pub fn record_terminations(count: usize) {
    counter!(names::HEARTBEAT_TERMINATIONS).increment(count as u64);
}

/// Record a gateway emit.
pub fn record_gateway_emit(scope: &'static str) {
    counter!(names::GATEWAY_EMITS, "scope" => scope).increment(1);
}

/// Update room and presence gauges.
pub fn set_hub_gauges(stats: HubStats) {
    gauge!(names::ROOMS_ACTIVE).set(stats.rooms as f64);
    gauge!(names::ONLINE_USERS).set(stats.online_users as f64);
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
