//! # parley-server
//!
//! Axum HTTP + `WebSocket` chat relay.
//!
//! - [`relay`]: the connection registry, presence broadcaster and message router
//! - [`websocket`]: per-connection state, lifecycle task and heartbeat
//! - [`server`]: router assembly, `/ws` upgrade, `/health`, `/metrics`, listen
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod relay;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use error::ServerError;
pub use relay::Relay;
pub use server::ParleyServer;
