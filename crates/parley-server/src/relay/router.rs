//! Inbound envelope dispatch.

use std::sync::Arc;

use metrics::counter;
use parley_core::{ConnectionId, DirectMessage, Envelope, Inbound};
use tracing::{debug, warn};

use super::registry::ConnectionRegistry;
use crate::metrics::{RELAY_MALFORMED_TOTAL, RELAY_MESSAGES_TOTAL};

/// What happened to one inbound frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Queued for the recipient.
    Delivered {
        /// Recipient id.
        to: ConnectionId,
    },
    /// No live connection has that id. Dropped silently.
    RecipientNotFound {
        /// The id the sender addressed.
        to: ConnectionId,
    },
    /// The recipient exists but its queue refused the message.
    RecipientUnavailable {
        /// Recipient id.
        to: ConnectionId,
    },
    /// A chat message with no recipient. Broadcast chat is not relayed.
    Untargeted,
    /// A kind this relay does not handle.
    Ignored {
        /// The unrecognised kind.
        kind: String,
    },
    /// The frame failed validation.
    Malformed {
        /// Short reason label.
        reason: &'static str,
    },
}

impl RouteOutcome {
    /// Metrics label for this outcome.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Delivered { .. } => "delivered",
            Self::RecipientNotFound { .. } => "recipient_not_found",
            Self::RecipientUnavailable { .. } => "recipient_unavailable",
            Self::Untargeted => "untargeted",
            Self::Ignored { .. } => "ignored",
            Self::Malformed { .. } => "malformed",
        }
    }
}

/// Routes inbound envelopes to their recipients.
pub struct MessageRouter {
    registry: Arc<ConnectionRegistry>,
}

impl MessageRouter {
    /// Create a router over a shared registry.
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Validate and dispatch one text frame from `source`.
    ///
    /// Never blocks on the recipient: delivery is a non-blocking enqueue.
    pub fn handle(&self, source: &ConnectionId, text: &str) -> RouteOutcome {
        let outcome = match Inbound::parse(text) {
            Ok(Inbound::Chat(message)) => self.route_chat(source, message),
            Ok(Inbound::Unknown { kind }) => {
                debug!(conn_id = %source, kind = %kind, "ignoring unknown envelope kind");
                RouteOutcome::Ignored { kind }
            }
            Err(error) => {
                warn!(conn_id = %source, %error, "dropping malformed envelope");
                counter!(RELAY_MALFORMED_TOTAL, "reason" => error.label()).increment(1);
                RouteOutcome::Malformed {
                    reason: error.label(),
                }
            }
        };
        counter!(RELAY_MESSAGES_TOTAL, "outcome" => outcome.label()).increment(1);
        outcome
    }

    fn route_chat(&self, source: &ConnectionId, mut message: DirectMessage) -> RouteOutcome {
        let Some(to) = message.to.take() else {
            debug!(conn_id = %source, "untargeted chat message dropped");
            return RouteOutcome::Untargeted;
        };

        let Some(recipient) = self.registry.lookup(&to) else {
            debug!(conn_id = %source, to = %to, "recipient not connected, dropping");
            return RouteOutcome::RecipientNotFound { to };
        };

        let envelope = Envelope::ChatMessage(message.relay_from(source.clone()));
        if recipient.send_envelope(&envelope) {
            debug!(conn_id = %source, to = %to, "chat message relayed");
            RouteOutcome::Delivered { to }
        } else {
            warn!(conn_id = %source, to = %to, "recipient queue refused chat message");
            RouteOutcome::RecipientUnavailable { to }
        }
    }
}
