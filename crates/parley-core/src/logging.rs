//! `tracing` subscriber setup.
//!
//! Call [`init_subscriber`] once at process startup. `RUST_LOG`, when set,
//! takes precedence over the configured level.

use serde::{Deserialize, Serialize};

/// Output format for log lines.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Single-line human readable output on stderr.
    #[default]
    Compact,
    /// One JSON object per line on stderr.
    Json,
}

impl LogFormat {
    /// Parse from a string (case-insensitive). Unknown values yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "compact" | "pretty" | "text" => Some(Self::Compact),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Initialize the global tracing subscriber.
///
/// `level` is an `EnvFilter` directive such as `"info"` or
/// `"parley_server=debug,info"`. Safe to call more than once: later calls
/// are no-ops.
pub fn init_subscriber(level: &str, format: LogFormat) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    // try_init fails only if a global subscriber is already installed
    let _ = match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
