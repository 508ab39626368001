//! # parley-core
//!
//! Foundation types shared across the Parley relay crates.
//!
//! - [`ids`]: branded connection identifiers
//! - [`protocol`]: the `{type, data}` wire envelope, inbound parsing and
//!   outbound construction
//! - [`errors`]: protocol validation errors
//! - [`logging`]: one-shot `tracing` subscriber setup for binaries

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod logging;
pub mod protocol;

pub use errors::ProtocolError;
pub use ids::ConnectionId;
pub use protocol::{DirectMessage, Envelope, Inbound, RelayedMessage, RosterEntry};
