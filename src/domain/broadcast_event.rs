//! Events fanned out to stream subscribers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::DeviceId;
use crate::protocol::ProtocolEvent;

/// An inbound protocol event tagged with the device that produced it.
///
/// Ephemeral: never persisted and delivered in a single fan-out pass.
#[derive(Debug, Clone, Serialize)]
pub struct BroadcastEvent {
    /// Server-generated event identifier.
    pub id: Uuid,
    /// Device whose client emitted the event.
    pub device_id: DeviceId,
    /// Time the gateway received the event.
    pub received_at: DateTime<Utc>,
    /// The protocol event itself.
    pub event: ProtocolEvent,
}

impl BroadcastEvent {
    /// Wraps a protocol event for broadcasting.
    #[must_use]
    pub fn new(device_id: DeviceId, event: ProtocolEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            device_id,
            received_at: Utc::now(),
            event,
        }
    }

    /// Returns the event kind discriminator (e.g. `"message"`).
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.event.kind_str()
    }
}
