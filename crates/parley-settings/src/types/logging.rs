//! Logging settings.

use parley_core::logging::LogFormat;
use serde::{Deserialize, Serialize};

/// Log level and output format.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive, e.g. `"info"` or `"parley_server=debug,info"`.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}
