//! Shutdown signalling and connection-task draining.
//!
//! Upgraded sockets leave axum's graceful-shutdown bookkeeping, so every
//! connection task is tracked here instead. Shutdown is complete once the
//! serve task has stopped and every tracked task has torn down.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tokio_util::task::task_tracker::TrackedFuture;
use tracing::{info, warn};

/// How long [`ShutdownCoordinator::graceful_shutdown`] waits by default.
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Shutdown token plus the set of live connection tasks.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    connections: TaskTracker,
}

impl ShutdownCoordinator {
    /// Create a coordinator with no tracked tasks.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            connections: TaskTracker::new(),
        }
    }

    /// Token observed by the listener and every connection task.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Signal shutdown. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has been signalled.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wrap a connection future so draining waits for it.
    pub fn track<F: Future>(&self, connection: F) -> TrackedFuture<F> {
        self.connections.track_future(connection)
    }

    /// Connection tasks not yet finished.
    pub fn active_connections(&self) -> usize {
        self.connections.len()
    }

    /// Signal shutdown, then wait for `handles` and every tracked
    /// connection task, up to `timeout`.
    pub async fn graceful_shutdown(&self, handles: Vec<JoinHandle<()>>, timeout: Option<Duration>) {
        let timeout = timeout.unwrap_or(DEFAULT_DRAIN_TIMEOUT);

        self.shutdown();
        let _ = self.connections.close();
        info!(
            listeners = handles.len(),
            connections = self.connections.len(),
            timeout_ms = timeout.as_millis() as u64,
            "draining"
        );

        let drain = async {
            let _ = futures::future::join_all(handles).await;
            self.connections.wait().await;
        };
        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!(
                remaining = self.connections.len(),
                "drain timed out after {timeout:?}"
            );
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
