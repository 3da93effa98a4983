//! Broadcast channel for meet signals.
//!
//! [`BroadcastChannel`] is the transport seam: one logical channel per
//! event, fire-and-forget publishing, no acknowledgement and no ordering
//! guarantee between subscribers. [`EventBus`] is the in-process
//! implementation over [`tokio::sync::broadcast`]; other transports (a
//! message broker, a Redis-style pub/sub) implement the same trait and feed
//! a [`Subscription`] from their own receive loop.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::{EventId, MeetSignal};

/// A signal addressed to one event's channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMessage {
    /// Channel key.
    pub event_id: EventId,
    /// Payload.
    pub signal: MeetSignal,
}

/// Failure to hand a signal to the transport.
///
/// Never retried: signals are fire-and-forget.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("transport error on channel {event_id}: {reason}")]
pub struct TransportError {
    /// Channel the publish was addressed to.
    pub event_id: EventId,
    /// Transport-specific description.
    pub reason: String,
}

/// Publish/subscribe capability used by the controller and the WebSocket
/// layer.
pub trait BroadcastChannel: Send + Sync + fmt::Debug {
    /// Publishes `signal` on the channel of `event_id`. Returns how many
    /// receivers it was handed to; zero is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the transport rejects the message.
    fn publish(&self, event_id: EventId, signal: MeetSignal) -> Result<usize, TransportError>;

    /// Subscribes to one event's channel.
    fn subscribe(&self, event_id: EventId) -> Subscription;

    /// Subscribes to every channel; callers filter per message.
    fn subscribe_all(&self) -> Subscription;
}

/// Receiving end of a subscription.
#[derive(Debug)]
pub struct Subscription {
    receiver: broadcast::Receiver<ChannelMessage>,
    filter: Option<EventId>,
}

impl Subscription {
    /// Wraps a broadcast receiver, optionally keeping only one channel.
    #[must_use]
    pub fn new(receiver: broadcast::Receiver<ChannelMessage>, filter: Option<EventId>) -> Self {
        Self { receiver, filter }
    }

    /// Waits for the next message on the subscribed channel(s).
    ///
    /// Messages lost because this receiver lagged are skipped with a
    /// warning. Returns `None` once the transport is closed.
    pub async fn recv(&mut self) -> Option<ChannelMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(msg) => {
                    if self.filter.is_none_or(|id| id == msg.event_id) {
                        return Some(msg);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(lagged = n, "subscriber lagged; signals dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// In-process [`BroadcastChannel`].
///
/// Backed by a `tokio::broadcast` ring buffer with a configurable
/// capacity. When the buffer is full the oldest messages are dropped for
/// lagging receivers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ChannelMessage>,
}

impl EventBus {
    /// Creates a new `EventBus` with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }
}

impl BroadcastChannel for EventBus {
    fn publish(&self, event_id: EventId, signal: MeetSignal) -> Result<usize, TransportError> {
        // `send` only fails when nobody listens, which is a normal state.
        Ok(self
            .sender
            .send(ChannelMessage { event_id, signal })
            .unwrap_or(0))
    }

    fn subscribe(&self, event_id: EventId) -> Subscription {
        Subscription::new(self.sender.subscribe(), Some(event_id))
    }

    fn subscribe_all(&self) -> Subscription {
        Subscription::new(self.sender.subscribe(), None)
    }
}
