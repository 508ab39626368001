//! Listener and per-connection settings.

use serde::{Deserialize, Serialize};

/// Server network and connection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// HTTP/WebSocket port.
    pub port: u16,
    /// Upgrades beyond this many live connections are refused with 503.
    pub max_connections: usize,
    /// Ping interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Close a peer after this long without a pong, in milliseconds.
    pub heartbeat_timeout_ms: u64,
    /// Upper bound on a single socket write, in milliseconds.
    pub send_timeout_ms: u64,
    /// Frames queued per peer before it is treated as stalled.
    pub outbound_queue: usize,
    /// Largest accepted inbound WebSocket message in bytes.
    pub max_message_bytes: usize,
    /// Display name for peers that connect without one.
    pub default_display_name: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_connections: 1024,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 90_000,
            send_timeout_ms: 10_000,
            outbound_queue: 256,
            max_message_bytes: 1024 * 1024,
            default_display_name: "Anonymous".to_string(),
        }
    }
}
