//! Boundary to the messaging protocol library.
//!
//! The wire protocol itself (handshake, encryption, encoding) is provided by
//! an external client. The gateway consumes it through [`ProtocolClient`],
//! one instance per device, created by a [`ClientFactory`].

pub mod bridge;
pub mod error;
pub mod event;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use bridge::{BridgeClient, BridgeClientFactory};
pub use error::{FailureClass, KNOWN_FAILURES, KnownFailure, ProtocolError};
pub use event::{Attachment, ProtocolEvent};

use crate::domain::{Device, DeviceId};

/// Callback invoked by a client for every inbound event.
///
/// Runs on the client's own task. Implementations must not block.
pub type EventHandler = Arc<dyn Fn(ProtocolEvent) + Send + Sync>;

/// A text message to send from a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Recipient address (user or group JID).
    pub to: String,
    /// Plain-text body.
    pub text: String,
}

/// Parameters of a state synchronization request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncCriteria {
    /// Name of the state patch collection to fetch.
    pub patch: String,
    /// Request a full snapshot instead of incremental patches.
    pub full_sync: bool,
    /// Skip the fetch if the collection is already in sync.
    pub only_if_not_synced: bool,
}

impl SyncCriteria {
    /// The collection fetched right after a device connects: a full sync of
    /// the low-priority critical patches, regardless of local state.
    #[must_use]
    pub fn post_connect() -> Self {
        Self {
            patch: "critical_unblock_low".to_string(),
            full_sync: true,
            only_if_not_synced: false,
        }
    }
}

/// One protocol session bound to a single device.
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    /// Device this client is bound to.
    fn device_id(&self) -> &DeviceId;

    /// Installs the handler that receives every inbound event, replacing any
    /// previous one. Must be called before [`connect`](Self::connect).
    fn set_event_handler(&self, handler: EventHandler);

    /// Opens the connection and authenticates with the stored credentials.
    async fn connect(&self) -> Result<(), ProtocolError>;

    /// Closes the connection. Never fails; problems are logged.
    async fn disconnect(&self);

    /// Requests a state synchronization.
    async fn fetch_state(&self, criteria: &SyncCriteria) -> Result<(), ProtocolError>;

    /// Sends a text message and returns its protocol message ID.
    async fn send_message(&self, message: &OutgoingMessage) -> Result<String, ProtocolError>;
}

/// Creates protocol clients for persisted devices.
pub trait ClientFactory: Send + Sync {
    /// Instantiates a client bound to the device's stored credentials.
    fn create(&self, device: &Device) -> Arc<dyn ProtocolClient>;
}
