//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a settings
//! file may name only the fields it wants to change.

mod logging;
mod server;

pub use logging::*;
pub use server::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type for the Parley relay.
///
/// ```json
/// {
///   "server": { "port": 9000, "defaultDisplayName": "guest" },
///   "logging": { "level": "debug", "format": "json" }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParleySettings {
    /// Listener, connection and liveness settings.
    pub server: ServerSettings,
    /// Log level and output format.
    pub logging: LoggingSettings,
}

impl ParleySettings {
    /// Reject combinations the relay cannot run with.
    pub fn validate(&self) -> Result<()> {
        let s = &self.server;
        if s.max_connections == 0 {
            return Err(SettingsError::invalid("server.maxConnections", "must be at least 1"));
        }
        if s.outbound_queue == 0 {
            return Err(SettingsError::invalid("server.outboundQueue", "must be at least 1"));
        }
        if s.heartbeat_interval_ms == 0 {
            return Err(SettingsError::invalid("server.heartbeatIntervalMs", "must be positive"));
        }
        if s.send_timeout_ms == 0 {
            return Err(SettingsError::invalid("server.sendTimeoutMs", "must be positive"));
        }
        if s.heartbeat_timeout_ms < s.heartbeat_interval_ms {
            return Err(SettingsError::invalid(
                "server.heartbeatTimeoutMs",
                format!(
                    "{} is shorter than server.heartbeatIntervalMs ({})",
                    s.heartbeat_timeout_ms, s.heartbeat_interval_ms
                ),
            ));
        }
        Ok(())
    }
}
