//! Server error types.

use metrics_exporter_prometheus::BuildError;
use thiserror::Error;

/// Errors raised while starting the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listen address could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address we tried to bind.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The Prometheus recorder could not be installed.
    #[error("metrics recorder: {0}")]
    Metrics(#[from] BuildError),
}
