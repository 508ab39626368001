//! Missed-pong liveness monitoring.
//!
//! The writer task sends the pings; this loop only watches whether the peer
//! has shown any sign of life between ticks.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;

use super::connection::ClientConnection;

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// The peer stopped responding within the timeout window.
    TimedOut,
    /// The heartbeat was cancelled externally.
    Cancelled,
}

/// Consecutive silent intervals tolerated before giving up on a peer.
pub fn max_missed(interval: Duration, timeout: Duration) -> u32 {
    let interval_ms = interval.as_millis().max(1);
    u32::try_from(timeout.as_millis() / interval_ms)
        .unwrap_or(u32::MAX)
        .max(1)
}

/// Watch a connection's alive flag until it goes quiet or `cancel` fires.
///
/// At each `interval` tick the alive flag is checked and reset. Once
/// `timeout / interval` consecutive ticks pass without activity the result
/// is [`HeartbeatResult::TimedOut`].
pub async fn run_heartbeat(
    connection: Arc<ClientConnection>,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut check_interval = time::interval_at(time::Instant::now() + interval, interval);
    let max_missed = max_missed(interval, timeout);
    let mut missed_pongs: u32 = 0;

    loop {
        tokio::select! {
            _ = check_interval.tick() => {
                if connection.check_alive() {
                    missed_pongs = 0;
                } else {
                    missed_pongs += 1;
                    if missed_pongs >= max_missed {
                        return HeartbeatResult::TimedOut;
                    }
                }
            }
            () = cancel.cancelled() => {
                return HeartbeatResult::Cancelled;
            }
        }
    }
}
