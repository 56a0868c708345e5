//! Persisted device record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::DeviceId;

/// A paired messaging account as stored by the device store.
///
/// `session_data` is opaque to the gateway: it is whatever the protocol
/// client needs to resume the session (keys, tokens, registration ids).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Stable device identifier.
    pub id: DeviceId,
    /// Push name announced by the account, if known.
    pub display_name: Option<String>,
    /// Protocol-specific credential blob.
    pub session_data: serde_json::Value,
    /// When the device was first paired.
    pub registered_at: DateTime<Utc>,
}

impl Device {
    /// Creates a device record registered now.
    #[must_use]
    pub fn new(id: impl Into<DeviceId>, session_data: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            session_data,
            registered_at: Utc::now(),
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}
