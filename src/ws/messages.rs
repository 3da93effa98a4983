//! WebSocket message types: envelope, commands, and replies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{EventId, LaneId, MeetSignal, RaceTime};
use crate::error::GatewayError;

/// Top-level WebSocket message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsMessage {
    /// Client-provided ID for requests; server-generated for events.
    pub id: String,
    /// Message type discriminator.
    #[serde(rename = "type")]
    pub msg_type: WsMessageType,
    /// ISO-8601 timestamp.
    pub timestamp: DateTime<Utc>,
    /// Variant-specific payload.
    pub payload: serde_json::Value,
}

impl WsMessage {
    /// Reply to the request `id`.
    #[must_use]
    pub fn response(id: String, payload: serde_json::Value) -> Self {
        Self {
            id,
            msg_type: WsMessageType::Response,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Error reply; `code` follows the REST error codes.
    #[must_use]
    pub fn error(id: String, code: u32, message: impl Into<String>) -> Self {
        Self {
            id,
            msg_type: WsMessageType::Error,
            timestamp: Utc::now(),
            payload: serde_json::json!({
                "code": code,
                "message": message.into(),
            }),
        }
    }

    /// Error reply built from a [`GatewayError`].
    #[must_use]
    pub fn from_error(id: String, err: &GatewayError) -> Self {
        let mut msg = Self::error(id, err.error_code(), err.to_string());
        if let Some(details) = err.details()
            && let Some(obj) = msg.payload.as_object_mut()
        {
            obj.insert("details".to_string(), details);
        }
        msg
    }

    /// Server-pushed signal of one event's channel.
    #[must_use]
    pub fn event(event_id: EventId, signal: &MeetSignal) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            msg_type: WsMessageType::Event,
            timestamp: Utc::now(),
            payload: serde_json::json!({
                "eventId": event_id,
                "signal": signal,
            }),
        }
    }
}

/// Discriminator for WebSocket message types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WsMessageType {
    /// Client → Server command.
    Command,
    /// Server → Client response to a command.
    Response,
    /// Server → Client broadcast signal.
    Event,
    /// Server → Client error.
    Error,
}

/// Commands that a client can send over WebSocket, carried in the
/// envelope's payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum WsCommand {
    /// Subscribe to the channels of specific events.
    Subscribe {
        /// Event IDs to subscribe to. Use `["*"]` for all events.
        event_ids: Vec<String>,
    },
    /// Unsubscribe from the channels of specific events.
    Unsubscribe {
        /// Event IDs to unsubscribe from.
        event_ids: Vec<String>,
    },
    /// Report a lane time from a timing station.
    SubmitTime {
        /// Target event.
        event_id: EventId,
        /// Heat the station believes is running.
        heat_number: u32,
        /// Epoch the station believes is current.
        epoch: u32,
        /// Lane identifier.
        lane_id: LaneId,
        /// Milliseconds or text such as `"32.45"`.
        final_time: RaceTime,
    },
    /// Relay a raw signal to the controller, as a station on a broker
    /// would.
    Signal {
        /// Target event.
        event_id: EventId,
        /// The signal.
        signal: MeetSignal,
    },
    /// Get the controller snapshot of an event.
    GetState {
        /// Target event.
        event_id: EventId,
    },
}
