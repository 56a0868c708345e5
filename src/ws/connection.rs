//! WebSocket connection loop.
//!
//! Handles the read/write loop for a single event stream, applying client
//! commands to its [`DeviceFilter`] and forwarding matching broadcast events.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, close_code};
use futures_util::{SinkExt, StreamExt};

use super::messages::{WsCommand, WsMessage, WsMessageType};
use super::subscription::DeviceFilter;
use crate::domain::{BroadcastEvent, EventReceiver, SubscriberId, SubscriberRegistry};

/// Runs the read/write loop for a single WebSocket connection.
///
/// - Reads commands from the client and answers them.
/// - Forwards events delivered to `events` that pass the device filter.
/// - Sends a close frame once the registry ends the stream, either because
///   the gateway is shutting down or because the subscriber fell behind.
///
/// The subscriber is always unregistered when the loop ends.
pub async fn run_connection(
    socket: WebSocket,
    subscriber_id: SubscriberId,
    mut events: EventReceiver,
    subscribers: Arc<SubscriberRegistry>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut filter = DeviceFilter::new();
    tracing::debug!(%subscriber_id, "ws subscriber connected");

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let response = handle_text_message(text.as_str(), &mut filter);
                        if let Some(resp_json) = response
                            && ws_tx.send(Message::text(resp_json)).await.is_err() {
                                break;
                            }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(%subscriber_id, error = %e, "ws read failed");
                        break;
                    }
                    _ => {}
                }
            }
            event = events.recv() => {
                match event {
                    Some(event) => {
                        if !filter.matches(&event.device_id) {
                            continue;
                        }
                        let Some(json) = encode_event(&event) else {
                            continue;
                        };
                        if ws_tx.send(Message::text(json)).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        let frame = if subscribers.is_closed() {
                            CloseFrame {
                                code: close_code::AWAY,
                                reason: Utf8Bytes::from_static("gateway shutting down"),
                            }
                        } else {
                            CloseFrame {
                                code: close_code::AGAIN,
                                reason: Utf8Bytes::from_static("subscriber fell behind"),
                            }
                        };
                        let _ = ws_tx.send(Message::Close(Some(frame))).await;
                        break;
                    }
                }
            }
        }
    }

    subscribers.unregister(subscriber_id);
    tracing::debug!(%subscriber_id, "ws connection closed");
}

/// Wraps a broadcast event in an `event` envelope.
fn encode_event(event: &BroadcastEvent) -> Option<String> {
    let payload = match serde_json::to_value(event) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(event_id = %event.id, error = %e, "failed to encode event");
            return None;
        }
    };
    let msg = WsMessage {
        id: event.id.to_string(),
        msg_type: WsMessageType::Event,
        timestamp: event.received_at,
        payload,
    };
    serde_json::to_string(&msg).ok()
}

/// Handles a text message from the client, returning an optional JSON response.
fn handle_text_message(text: &str, filter: &mut DeviceFilter) -> Option<String> {
    let Ok(msg) = serde_json::from_str::<WsMessage>(text) else {
        return serde_json::to_string(&WsMessage::error("", 400, "malformed JSON")).ok();
    };

    if msg.msg_type != WsMessageType::Command {
        return serde_json::to_string(&WsMessage::error(msg.id, 400, "expected a command")).ok();
    }

    let command = match serde_json::from_value::<WsCommand>(msg.payload) {
        Ok(command) => command,
        Err(e) => {
            let message = format!("unknown command: {e}");
            return serde_json::to_string(&WsMessage::error(msg.id, 400, &message)).ok();
        }
    };

    let payload = match command {
        WsCommand::Subscribe { device_ids } => {
            filter.subscribe(device_ids.as_slice());
            serde_json::json!({
                "subscribed": device_ids,
                "count": filter.count(),
                "all": filter.is_all(),
            })
        }
        WsCommand::Unsubscribe { device_ids } => {
            filter.unsubscribe(device_ids.as_slice());
            serde_json::json!({
                "unsubscribed": device_ids,
                "remaining_count": filter.count(),
                "all": filter.is_all(),
                "excluded_count": filter.excluded_count(),
            })
        }
        WsCommand::Ping => serde_json::json!({ "pong": true }),
    };

    serde_json::to_string(&WsMessage::new(msg.id, WsMessageType::Response, payload)).ok()
}
