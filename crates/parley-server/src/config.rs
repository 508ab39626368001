//! Server configuration.

use std::time::Duration;

use parley_settings::ServerSettings;
use serde::{Deserialize, Serialize};

/// Runtime configuration for [`ParleyServer`](crate::ParleyServer).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Upgrades beyond this many live connections are refused with 503.
    pub max_connections: usize,
    /// Ping and liveness-check interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Close a peer after this long without any inbound frame.
    pub heartbeat_timeout_ms: u64,
    /// Upper bound on a single socket write in milliseconds.
    pub send_timeout_ms: u64,
    /// Per-connection outbound queue capacity.
    pub outbound_queue: usize,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Display name used when the handshake carries none.
    pub default_display_name: String,
}

impl ServerConfig {
    /// Heartbeat interval.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Heartbeat timeout.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    /// Socket write timeout.
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 1024,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 90_000,
            send_timeout_ms: 10_000,
            outbound_queue: 256,
            max_message_size: 1024 * 1024,
            default_display_name: "Anonymous".into(),
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(s: &ServerSettings) -> Self {
        Self {
            host: s.host.clone(),
            port: s.port,
            max_connections: s.max_connections,
            heartbeat_interval_ms: s.heartbeat_interval_ms,
            heartbeat_timeout_ms: s.heartbeat_timeout_ms,
            send_timeout_ms: s.send_timeout_ms,
            outbound_queue: s.outbound_queue,
            max_message_size: s.max_message_bytes,
            default_display_name: s.default_display_name.clone(),
        }
    }
}
