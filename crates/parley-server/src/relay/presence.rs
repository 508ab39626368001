//! Roster fan-out after membership changes.

use std::sync::Arc;

use metrics::counter;
use parley_core::Envelope;
use tracing::{debug, warn};

use super::registry::ConnectionRegistry;
use crate::metrics::PRESENCE_BROADCASTS_TOTAL;

/// Pushes `ROSTER_UPDATE` to every live connection.
pub struct PresenceBroadcaster {
    registry: Arc<ConnectionRegistry>,
}

impl PresenceBroadcaster {
    /// Create a broadcaster over a shared registry.
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Snapshot the roster and queue it to every peer.
    ///
    /// Snapshot and fan-out happen under one read view, so every peer gets
    /// roster updates in the order membership changed. Returns the number of
    /// peers the update was queued for.
    pub fn announce(&self) -> usize {
        let view = self.registry.view();
        let roster = view.roster();
        let roster_size = roster.len();

        let json = match Envelope::RosterUpdate(roster).to_json() {
            Ok(json) => Arc::new(json),
            Err(error) => {
                warn!(%error, "failed to serialize roster");
                return 0;
            }
        };

        let mut delivered = 0;
        for conn in view.connections() {
            if conn.send(Arc::clone(&json)) {
                delivered += 1;
            } else {
                warn!(conn_id = %conn.id, "failed to queue roster update");
            }
        }
        drop(view);

        counter!(PRESENCE_BROADCASTS_TOTAL).increment(1);
        debug!(roster_size, delivered, "roster announced");
        delivered
    }
}
