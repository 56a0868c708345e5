//! Device DTOs for the device listing and removal endpoints.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::Device;

/// A persisted device. Session credentials are never exposed.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DeviceDto {
    /// Device identifier.
    pub device_id: String,
    /// Account user part of the identifier.
    pub user: String,
    /// Optional human-readable name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Time the device was first stored.
    pub registered_at: DateTime<Utc>,
    /// Whether the device currently has a connected session.
    pub connected: bool,
}

impl DeviceDto {
    /// Builds the DTO for `device` with its current connection state.
    #[must_use]
    pub fn new(device: Device, connected: bool) -> Self {
        Self {
            user: device.id.user().to_string(),
            device_id: device.id.into(),
            display_name: device.display_name,
            registered_at: device.registered_at,
            connected,
        }
    }
}

/// Response body for `GET /api/v1/devices`.
#[derive(Debug, Serialize, ToSchema)]
pub struct DeviceListResponse {
    /// Persisted devices in store order.
    pub data: Vec<DeviceDto>,
    /// Number of devices.
    pub total: usize,
}

/// Response body for `DELETE /api/v1/devices/{device_id}`.
#[derive(Debug, Serialize, ToSchema)]
pub struct RemoveDeviceResponse {
    /// Device that was logged out.
    pub device_id: String,
    /// Whether a connected session was torn down.
    pub was_connected: bool,
}
