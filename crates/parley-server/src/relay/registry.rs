//! Authoritative map of live connections.
//!
//! Insertion-ordered so roster snapshots list peers in the order they
//! joined. Guarded by a `parking_lot::RwLock`; every critical section is
//! synchronous, so no guard is ever held across an `.await`.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{RwLock, RwLockReadGuard};
use parley_core::{ConnectionId, Envelope, RosterEntry};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::websocket::connection::ClientConnection;

type ConnectionMap = IndexMap<ConnectionId, Arc<ClientConnection>>;

/// Registry of connected peers, keyed by relay-assigned id.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<ConnectionMap>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a new peer.
    ///
    /// Generates a fresh id, queues `IDENTITY_ASSIGNED` on `tx` and inserts
    /// the connection, all under the write lock: no other component can
    /// observe the peer before its identity is queued.
    pub fn register(
        &self,
        display_name: impl Into<String>,
        tx: mpsc::Sender<Arc<String>>,
    ) -> Arc<ClientConnection> {
        let mut connections = self.connections.write();

        let mut id = ConnectionId::new();
        while connections.contains_key(&id) {
            warn!(conn_id = %id, "connection id collision, regenerating");
            id = ConnectionId::new();
        }

        let conn = Arc::new(ClientConnection::new(id.clone(), display_name.into(), tx));
        if !conn.send_envelope(&Envelope::IdentityAssigned(id.clone())) {
            warn!(conn_id = %id, "failed to queue identity");
        }
        let _ = connections.insert(id, Arc::clone(&conn));
        debug!(conn_id = %conn.id, total = connections.len(), "connection registered");
        conn
    }

    /// Remove a peer. Returns the removed connection, or `None` if it was
    /// already gone.
    pub fn unregister(&self, id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        let mut connections = self.connections.write();
        let removed = connections.shift_remove(id);
        if removed.is_some() {
            debug!(conn_id = %id, total = connections.len(), "connection unregistered");
        }
        removed
    }

    /// Find a live connection by id.
    pub fn lookup(&self, id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        self.connections.read().get(id).cloned()
    }

    /// Point-in-time roster in registration order.
    pub fn snapshot(&self) -> Vec<RosterEntry> {
        self.view().roster()
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    /// Whether no peers are connected.
    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    /// Hold the read lock for a consistent view across several reads.
    ///
    /// Registration and removal block until the view is dropped. Keep it
    /// short-lived and never hold it across an `.await`.
    pub fn view(&self) -> RegistryView<'_> {
        RegistryView {
            guard: self.connections.read(),
        }
    }
}

/// Read-locked view of the registry.
pub struct RegistryView<'a> {
    guard: RwLockReadGuard<'a, ConnectionMap>,
}

impl RegistryView<'_> {
    /// Roster rows in registration order.
    pub fn roster(&self) -> Vec<RosterEntry> {
        self.guard.values().map(|c| c.roster_entry()).collect()
    }

    /// Live connections in registration order.
    pub fn connections(&self) -> impl Iterator<Item = &Arc<ClientConnection>> {
        self.guard.values()
    }
}
