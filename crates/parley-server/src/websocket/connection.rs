//! Per-peer connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use metrics::counter;
use parking_lot::Mutex;
use parley_core::{ConnectionId, Envelope, RosterEntry};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::warn;

use crate::metrics::WS_SEND_DROPS_TOTAL;

/// A connected WebSocket peer.
pub struct ClientConnection {
    /// Relay-assigned identity.
    pub id: ConnectionId,
    /// Label from the handshake. Not unique.
    display_name: String,
    /// Queue drained by the connection's writer task.
    tx: mpsc::Sender<Arc<String>>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Whether the peer has shown activity since the last heartbeat tick.
    pub is_alive: AtomicBool,
    /// When the last Pong (or any inbound frame) was received.
    last_pong: Mutex<Instant>,
    /// Count of messages that could not be queued.
    pub dropped_messages: AtomicU64,
    /// Cancelled once the connection is on its way out.
    close: CancellationToken,
}

impl ClientConnection {
    /// Create a connection around an outbound queue.
    pub fn new(id: ConnectionId, display_name: String, tx: mpsc::Sender<Arc<String>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            display_name,
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
            close: CancellationToken::new(),
        }
    }

    /// Display name supplied at connect time.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// This connection's row in the roster.
    pub fn roster_entry(&self) -> RosterEntry {
        RosterEntry {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
        }
    }

    /// Queue a serialized frame without waiting.
    ///
    /// A full queue means the peer cannot keep up: the message is dropped
    /// and the connection is closed. Returns `false` whenever the frame was
    /// not queued.
    pub fn send(&self, message: Arc<String>) -> bool {
        match self.tx.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.record_drop();
                if !self.close.is_cancelled() {
                    warn!(conn_id = %self.id, "outbound queue full, closing slow peer");
                }
                self.close();
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.record_drop();
                false
            }
        }
    }

    /// Serialize an envelope and queue it.
    pub fn send_envelope(&self, envelope: &Envelope) -> bool {
        match envelope.to_json() {
            Ok(json) => self.send(Arc::new(json)),
            Err(error) => {
                warn!(conn_id = %self.id, kind = envelope.kind(), %error, "failed to serialize envelope");
                false
            }
        }
    }

    fn record_drop(&self) {
        let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
        counter!(WS_SEND_DROPS_TOTAL).increment(1);
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Mark the connection as alive (pong or other inbound frame).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Duration since the last pong (or connection establishment).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Check and reset the alive flag for heartbeat.
    ///
    /// Returns `true` if the connection was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Request teardown. Idempotent.
    pub fn close(&self) {
        self.close.cancel();
    }

    /// Whether teardown has been requested.
    pub fn is_closed(&self) -> bool {
        self.close.is_cancelled()
    }

    /// Resolves once [`close`](Self::close) has been called.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.close.cancelled()
    }

    /// A handle on the close token for tasks that outlive a borrow.
    pub fn close_token(&self) -> CancellationToken {
        self.close.clone()
    }
}
