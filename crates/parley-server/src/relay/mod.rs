//! Relay core: who is connected, who hears about it, where messages go.
//!
//! One [`ConnectionRegistry`] is built per [`Relay`] and shared by
//! reference with the [`MessageRouter`] and [`PresenceBroadcaster`].

pub mod presence;
pub mod registry;
pub mod router;

use std::sync::Arc;

pub use presence::PresenceBroadcaster;
pub use registry::{ConnectionRegistry, RegistryView};
pub use router::{MessageRouter, RouteOutcome};

/// The registry plus the two components that read it.
pub struct Relay {
    /// Authoritative id → connection map.
    pub registry: Arc<ConnectionRegistry>,
    /// Dispatches inbound envelopes.
    pub router: MessageRouter,
    /// Pushes the roster after membership changes.
    pub presence: PresenceBroadcaster,
}

impl Relay {
    /// Build a relay around a fresh, empty registry.
    pub fn new() -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        Self {
            router: MessageRouter::new(Arc::clone(&registry)),
            presence: PresenceBroadcaster::new(Arc::clone(&registry)),
            registry,
        }
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self::new()
    }
}
