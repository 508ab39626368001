//! Per-connection lifecycle: register, announce, pump frames, tear down.
//!
//! Each upgraded socket gets three tasks: the reader (this function's own
//! task), a writer draining the outbound queue, and a heartbeat monitor.
//! Any of them can end the connection by cancelling its close token.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::connection::ClientConnection;
use super::heartbeat::{HeartbeatResult, run_heartbeat};
use crate::config::ServerConfig;
use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL};
use crate::relay::Relay;

/// Everything a connection task needs from the server.
#[derive(Clone)]
pub struct ConnectionContext {
    /// Registry, router and broadcaster.
    pub relay: Arc<Relay>,
    /// Timeouts and queue sizes.
    pub config: Arc<ServerConfig>,
    /// Server-wide shutdown signal.
    pub shutdown: CancellationToken,
}

/// Why a connection ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// Close frame or end of stream from the peer.
    PeerClosed,
    /// Read error on the socket.
    TransportError,
    /// The peer sent a binary frame.
    ProtocolViolation,
    /// Closed from our side: write failure, full queue or heartbeat timeout.
    Evicted,
    /// The server is shutting down.
    Shutdown,
}

impl CloseReason {
    /// Log label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PeerClosed => "peer_closed",
            Self::TransportError => "transport_error",
            Self::ProtocolViolation => "protocol_violation",
            Self::Evicted => "evicted",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Drive one upgraded socket from registration to teardown.
pub async fn run_connection(socket: WebSocket, display_name: String, ctx: ConnectionContext) {
    let (sink, mut stream) = socket.split();
    let (tx, rx) = mpsc::channel(ctx.config.outbound_queue);

    let conn = ctx.relay.registry.register(display_name, tx);
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    record_active(&ctx);
    info!(conn_id = %conn.id, display_name = conn.display_name(), "client connected");
    let _ = ctx.relay.presence.announce();

    let writer = tokio::spawn(write_loop(
        sink,
        rx,
        Arc::clone(&conn),
        ctx.config.heartbeat_interval(),
        ctx.config.send_timeout(),
    ));
    let heartbeat = tokio::spawn(monitor(
        Arc::clone(&conn),
        ctx.config.heartbeat_interval(),
        ctx.config.heartbeat_timeout(),
    ));

    let reason = read_loop(&mut stream, &conn, &ctx).await;

    conn.close();
    if ctx.relay.registry.unregister(&conn.id).is_some() {
        counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
        record_active(&ctx);
        let _ = ctx.relay.presence.announce();
    }

    let _ = writer.await;
    let _ = heartbeat.await;

    info!(
        conn_id = %conn.id,
        display_name = conn.display_name(),
        reason = reason.as_str(),
        age_ms = conn.age().as_millis() as u64,
        dropped = conn.drop_count(),
        "client disconnected"
    );
}

fn record_active(ctx: &ConnectionContext) {
    gauge!(WS_CONNECTIONS_ACTIVE).set(ctx.relay.registry.len() as f64);
}

/// Feed inbound frames to the router, in arrival order, until something
/// ends the connection.
async fn read_loop(
    stream: &mut SplitStream<WebSocket>,
    conn: &ClientConnection,
    ctx: &ConnectionContext,
) -> CloseReason {
    loop {
        let frame = tokio::select! {
            () = conn.closed() => return CloseReason::Evicted,
            () = ctx.shutdown.cancelled() => return CloseReason::Shutdown,
            frame = stream.next() => frame,
        };

        let msg = match frame {
            None => return CloseReason::PeerClosed,
            Some(Err(error)) => {
                debug!(conn_id = %conn.id, %error, "socket read failed");
                return CloseReason::TransportError;
            }
            Some(Ok(msg)) => msg,
        };

        conn.mark_alive();
        match msg {
            WsMessage::Text(text) => {
                let _ = ctx.relay.router.handle(&conn.id, text.as_str());
            }
            WsMessage::Binary(bytes) => {
                warn!(conn_id = %conn.id, len = bytes.len(), "binary frame rejected, closing");
                return CloseReason::ProtocolViolation;
            }
            WsMessage::Close(_) => return CloseReason::PeerClosed,
            WsMessage::Ping(_) | WsMessage::Pong(_) => {}
        }
    }
}

/// Drain the outbound queue to the socket and send periodic pings.
///
/// Every write is bounded by `send_timeout`. Cancels the close token on
/// exit so the reader stops too.
async fn write_loop(
    mut sink: SplitSink<WebSocket, WsMessage>,
    mut rx: mpsc::Receiver<Arc<String>>,
    conn: Arc<ClientConnection>,
    ping_every: Duration,
    send_timeout: Duration,
) {
    let mut ping = time::interval_at(time::Instant::now() + ping_every, ping_every);

    loop {
        let frame = tokio::select! {
            () = conn.closed() => break,
            msg = rx.recv() => match msg {
                Some(text) => WsMessage::Text(String::clone(&text).into()),
                None => break,
            },
            _ = ping.tick() => WsMessage::Ping(Vec::new().into()),
        };

        match time::timeout(send_timeout, sink.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                debug!(conn_id = %conn.id, %error, "socket write failed");
                break;
            }
            Err(_) => {
                warn!(
                    conn_id = %conn.id,
                    timeout_ms = send_timeout.as_millis() as u64,
                    "socket write timed out"
                );
                break;
            }
        }
    }

    conn.close();
    let _ = time::timeout(send_timeout, sink.close()).await;
}

async fn monitor(conn: Arc<ClientConnection>, interval: Duration, timeout: Duration) {
    if run_heartbeat(Arc::clone(&conn), interval, timeout, conn.close_token()).await
        == HeartbeatResult::TimedOut
    {
        warn!(
            conn_id = %conn.id,
            silent_ms = conn.last_pong_elapsed().as_millis() as u64,
            "heartbeat timed out, closing"
        );
        conn.close();
    }
}
