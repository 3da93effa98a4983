//! WebSocket connection state machine.
//!
//! Handles the read/write loop for a single WebSocket connection,
//! dispatching incoming commands and forwarding filtered signals.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};

use super::messages::{WsCommand, WsMessage, WsMessageType};
use super::subscription::SubscriptionManager;
use crate::api::dto::{EventSnapshotResponse, SubmitTimeResponse};
use crate::domain::{HeatTag, Subscription};
use crate::service::MeetService;

/// Runs the read/write loop for a single WebSocket connection.
///
/// - Reads commands from the client and dispatches them.
/// - Forwards signals of subscribed events from `signals` to the client.
pub async fn run_connection(
    socket: WebSocket,
    mut signals: Subscription,
    meet_service: Arc<MeetService>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut subs = SubscriptionManager::new();

    loop {
        tokio::select! {
            // Incoming message from client
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_text_message(&text, &mut subs, &meet_service).await;
                        if let Some(reply_json) = to_json(&reply)
                            && ws_tx.send(Message::text(reply_json)).await.is_err() {
                                break;
                            }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
            // Signal from the broadcast channel
            received = signals.recv() => {
                let Some(channel_msg) = received else { break };
                if subs.matches(channel_msg.event_id) {
                    let msg = WsMessage::event(channel_msg.event_id, &channel_msg.signal);
                    if let Some(json) = to_json(&msg)
                        && ws_tx.send(Message::text(json)).await.is_err() {
                            break;
                        }
                }
            }
        }
    }

    tracing::debug!("ws connection closed");
}

fn to_json(msg: &WsMessage) -> Option<String> {
    serde_json::to_string(msg)
        .inspect_err(|e| tracing::warn!(error = %e, "ws message not serializable"))
        .ok()
}

/// Handles a text message from the client, returning the reply.
async fn handle_text_message(
    text: &str,
    subs: &mut SubscriptionManager,
    meet_service: &MeetService,
) -> WsMessage {
    let Ok(msg) = serde_json::from_str::<WsMessage>(text) else {
        return WsMessage::error(String::new(), 400, "malformed JSON");
    };
    if msg.msg_type != WsMessageType::Command {
        return WsMessage::error(msg.id, 400, "only command messages are accepted");
    }
    let command = match serde_json::from_value::<WsCommand>(msg.payload) {
        Ok(command) => command,
        Err(e) => return WsMessage::error(msg.id, 404, format!("unknown command: {e}")),
    };

    match command {
        WsCommand::Subscribe { event_ids } => {
            let (ids, wildcard, invalid) = SubscriptionManager::parse_ids(&event_ids);
            subs.subscribe(&ids, wildcard);
            WsMessage::response(
                msg.id,
                serde_json::json!({
                    "subscribed": ids,
                    "invalid": invalid,
                    "count": subs.count(),
                    "wildcard": subs.is_subscribed_all(),
                }),
            )
        }
        WsCommand::Unsubscribe { event_ids } => {
            let (ids, wildcard, _) = SubscriptionManager::parse_ids(&event_ids);
            subs.unsubscribe(&ids, wildcard);
            WsMessage::response(
                msg.id,
                serde_json::json!({
                    "unsubscribed": ids,
                    "remaining_count": subs.count(),
                }),
            )
        }
        WsCommand::SubmitTime {
            event_id,
            heat_number,
            epoch,
            lane_id,
            final_time,
        } => match meet_service
            .submit_time(event_id, HeatTag::new(heat_number, epoch), lane_id, final_time)
            .await
        {
            Ok(outcome) => reply(msg.id, &SubmitTimeResponse::from(outcome)),
            Err(e) => WsMessage::from_error(msg.id, &e),
        },
        WsCommand::Signal { event_id, signal } => {
            match meet_service.ingest(event_id, signal).await {
                Ok(outcome) => reply(msg.id, &SubmitTimeResponse::from(outcome)),
                Err(e) => WsMessage::from_error(msg.id, &e),
            }
        }
        WsCommand::GetState { event_id } => match meet_service.snapshot(event_id).await {
            Ok(snapshot) => reply(msg.id, &EventSnapshotResponse::from(snapshot)),
            Err(e) => WsMessage::from_error(msg.id, &e),
        },
    }
}

fn reply<T: serde::Serialize>(id: String, body: &T) -> WsMessage {
    match serde_json::to_value(body) {
        Ok(payload) => WsMessage::response(id, payload),
        Err(e) => WsMessage::error(id, 3000, format!("response not serializable: {e}")),
    }
}
