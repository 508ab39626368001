//! WebSocket connection state, lifecycle and liveness monitoring.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `connection` | Per-peer identity, outbound queue and close token |
//! | `lifecycle` | Upgrade → register → read/write loops → teardown |
//! | `heartbeat` | Missed-pong detection |

pub mod connection;
pub mod heartbeat;
pub mod lifecycle;
