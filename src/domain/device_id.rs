//! Type-safe device identifier.
//!
//! [`DeviceId`] is a newtype around the protocol's stable account address
//! (for example `34600111222:12@s.whatsapp.net`) so that device identities
//! cannot be confused with other strings flowing through the gateway.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier of a persisted messaging device.
///
/// Assigned by the protocol at pairing time and immutable thereafter. Used
/// as the key of the active session set, the device store and the
/// per-connection event filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Creates a `DeviceId` from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the user part of the address, without device suffix or server.
    ///
    /// `34600111222:12@s.whatsapp.net` becomes `34600111222`.
    #[must_use]
    pub fn user(&self) -> &str {
        let local = self.0.split('@').next().unwrap_or_default();
        local.split(':').next().unwrap_or_default()
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> Self {
        id.0
    }
}
