//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::error::ServerError;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render `/metrics`. Call once at
/// startup before any metrics are recorded; a second call fails.
pub fn install_recorder() -> Result<PrometheusHandle, ServerError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe();
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

fn describe() {
    metrics::describe_counter!(WS_CONNECTIONS_TOTAL, "WebSocket connections accepted");
    metrics::describe_counter!(WS_DISCONNECTIONS_TOTAL, "WebSocket connections torn down");
    metrics::describe_gauge!(WS_CONNECTIONS_ACTIVE, "Live registered connections");
    metrics::describe_counter!(WS_SEND_DROPS_TOTAL, "Frames that could not be queued for a peer");
    metrics::describe_counter!(RELAY_MESSAGES_TOTAL, "Inbound frames by routing outcome");
    metrics::describe_counter!(RELAY_MALFORMED_TOTAL, "Inbound frames that failed validation");
    metrics::describe_counter!(PRESENCE_BROADCASTS_TOTAL, "Roster fan-outs");
}

// Metric name constants.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Outbound frames dropped on a full or closed queue (counter).
pub const WS_SEND_DROPS_TOTAL: &str = "ws_send_drops_total";
/// Inbound frames handled (counter, labels: outcome).
pub const RELAY_MESSAGES_TOTAL: &str = "relay_messages_total";
/// Malformed inbound frames (counter, labels: reason).
pub const RELAY_MALFORMED_TOTAL: &str = "relay_malformed_total";
/// Roster broadcasts (counter).
pub const PRESENCE_BROADCASTS_TOTAL: &str = "presence_broadcasts_total";
