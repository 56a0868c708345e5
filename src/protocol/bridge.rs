//! Protocol client that talks to an out-of-process protocol bridge.
//!
//! The bridge owns the actual messaging protocol stack and exposes each
//! device session over a WebSocket carrying JSON frames:
//!
//! | Direction        | Frame                                                   |
//! |------------------|---------------------------------------------------------|
//! | gateway → bridge | `{"type":"connect","device_id":..,"session":{..}}`      |
//! | gateway → bridge | `{"type":"fetch_state","criteria":{..}}`                |
//! | gateway → bridge | `{"type":"send_message","message_id":..,"to":..,"text":..}` |
//! | gateway → bridge | `{"type":"disconnect"}`                                 |
//! | bridge → gateway | `{"type":"connected"}`                                  |
//! | bridge → gateway | `{"type":"error","message":".."}`                       |
//! | bridge → gateway | `{"type":"event","event":{"kind":..}}`                  |
//!
//! Handshake errors carry the library's raw message and are typed through
//! [`ProtocolError::from_message`].

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::{
    ClientFactory, EventHandler, OutgoingMessage, ProtocolClient, ProtocolError, ProtocolEvent,
    SyncCriteria,
};
use crate::domain::{Device, DeviceId};

type BridgeStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type BridgeSink = SplitSink<BridgeStream, Message>;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Outbound<'a> {
    Connect {
        device_id: &'a DeviceId,
        session: &'a serde_json::Value,
    },
    FetchState {
        criteria: &'a SyncCriteria,
    },
    SendMessage {
        message_id: &'a str,
        to: &'a str,
        text: &'a str,
    },
    Disconnect,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Inbound {
    Connected,
    Error { message: String },
    Event { event: ProtocolEvent },
}

/// Creates [`BridgeClient`]s pointing at a single bridge endpoint.
#[derive(Debug, Clone)]
pub struct BridgeClientFactory {
    url: String,
    connect_timeout: Duration,
}

impl BridgeClientFactory {
    /// Creates a factory for the bridge at `url` (e.g. `ws://127.0.0.1:8765`).
    #[must_use]
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            connect_timeout,
        }
    }
}

impl ClientFactory for BridgeClientFactory {
    fn create(&self, device: &Device) -> Arc<dyn ProtocolClient> {
        Arc::new(BridgeClient::new(
            device.clone(),
            self.url.clone(),
            self.connect_timeout,
        ))
    }
}

/// [`ProtocolClient`] backed by one WebSocket connection to the bridge.
pub struct BridgeClient {
    device: Device,
    url: String,
    connect_timeout: Duration,
    handler: Mutex<Option<EventHandler>>,
    sink: tokio::sync::Mutex<Option<BridgeSink>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for BridgeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeClient")
            .field("device_id", &self.device.id)
            .field("url", &self.url)
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

impl BridgeClient {
    /// Creates a disconnected client for `device`.
    #[must_use]
    pub fn new(device: Device, url: String, connect_timeout: Duration) -> Self {
        Self {
            device,
            url,
            connect_timeout,
            handler: Mutex::new(None),
            sink: tokio::sync::Mutex::new(None),
            reader: Mutex::new(None),
        }
    }

    fn current_handler(&self) -> Option<EventHandler> {
        self.handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace_reader(&self, reader: Option<JoinHandle<()>>) {
        let previous = {
            let mut slot = self.reader.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *slot, reader)
        };
        if let Some(previous) = previous {
            previous.abort();
        }
    }
}

#[async_trait]
impl ProtocolClient for BridgeClient {
    fn device_id(&self) -> &DeviceId {
        &self.device.id
    }

    fn set_event_handler(&self, handler: EventHandler) {
        *self.handler.lock().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    async fn connect(&self) -> Result<(), ProtocolError> {
        let (stream, _) = tokio::time::timeout(self.connect_timeout, connect_async(self.url.as_str()))
            .await
            .map_err(|_| ProtocolError::Timeout(format!("connecting to bridge at {}", self.url)))?
            .map_err(|e| ProtocolError::Network(e.to_string()))?;
        let (mut sink, mut stream) = stream.split();

        send_frame(
            &mut sink,
            &Outbound::Connect {
                device_id: &self.device.id,
                session: &self.device.session_data,
            },
        )
        .await?;

        let reply = tokio::time::timeout(self.connect_timeout, next_frame(&mut stream))
            .await
            .map_err(|_| ProtocolError::Timeout("waiting for bridge handshake".to_string()))??;
        match reply {
            Inbound::Connected => {}
            Inbound::Error { message } => return Err(ProtocolError::from_message(&message)),
            Inbound::Event { .. } => {
                return Err(ProtocolError::Other(
                    "bridge sent an event before the handshake completed".to_string(),
                ));
            }
        }

        *self.sink.lock().await = Some(sink);
        let reader = tokio::spawn(read_loop(
            stream,
            self.current_handler(),
            self.device.id.clone(),
        ));
        self.replace_reader(Some(reader));
        Ok(())
    }

    async fn disconnect(&self) {
        let sink = self.sink.lock().await.take();
        if let Some(mut sink) = sink {
            if let Err(e) = send_frame(&mut sink, &Outbound::Disconnect).await {
                tracing::debug!(device_id = %self.device.id, error = %e, "disconnect frame not sent");
            }
            if let Err(e) = sink.close().await {
                tracing::debug!(device_id = %self.device.id, error = %e, "bridge socket close failed");
            }
        }
        self.replace_reader(None);
    }

    async fn fetch_state(&self, criteria: &SyncCriteria) -> Result<(), ProtocolError> {
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(ProtocolError::NotConnected)?;
        send_frame(sink, &Outbound::FetchState { criteria }).await
    }

    /// The message ID is assigned here; delivery shows up later as receipt
    /// events.
    async fn send_message(&self, message: &OutgoingMessage) -> Result<String, ProtocolError> {
        let message_id = uuid::Uuid::new_v4().simple().to_string().to_uppercase();
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(ProtocolError::NotConnected)?;
        send_frame(
            sink,
            &Outbound::SendMessage {
                message_id: &message_id,
                to: &message.to,
                text: &message.text,
            },
        )
        .await?;
        Ok(message_id)
    }
}

async fn send_frame(sink: &mut BridgeSink, frame: &Outbound<'_>) -> Result<(), ProtocolError> {
    let json = serde_json::to_string(frame).map_err(|e| ProtocolError::Other(e.to_string()))?;
    sink.send(Message::text(json))
        .await
        .map_err(|e| ProtocolError::Network(e.to_string()))
}

/// Reads frames until the first parseable one.
async fn next_frame(stream: &mut SplitStream<BridgeStream>) -> Result<Inbound, ProtocolError> {
    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                return serde_json::from_str(text.as_str())
                    .map_err(|e| ProtocolError::Other(format!("malformed bridge frame: {e}")));
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => return Err(ProtocolError::Network(e.to_string())),
        }
    }
    Err(ProtocolError::Network(
        "bridge closed the connection during handshake".to_string(),
    ))
}

async fn read_loop(
    mut stream: SplitStream<BridgeStream>,
    handler: Option<EventHandler>,
    device_id: DeviceId,
) {
    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<Inbound>(text.as_str()) {
                Ok(Inbound::Event { event }) => {
                    if let Some(handler) = &handler {
                        handler(event);
                    }
                }
                Ok(Inbound::Error { message }) => {
                    tracing::warn!(%device_id, %message, "bridge reported an error");
                }
                Ok(Inbound::Connected) => {}
                Err(e) => {
                    tracing::warn!(%device_id, error = %e, "malformed bridge frame");
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(%device_id, error = %e, "bridge connection failed");
                break;
            }
        }
    }
    tracing::info!(%device_id, "bridge connection closed");
    if let Some(handler) = &handler {
        handler(ProtocolEvent::Disconnected);
    }
}
