//! Outgoing message DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Request body for `POST /api/v1/devices/{device_id}/messages`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SendMessageRequest {
    /// Recipient address (e.g. `"34600333444@s.whatsapp.net"`).
    pub to: String,
    /// Plain-text body.
    pub text: String,
}

/// Response body for a sent message.
#[derive(Debug, Serialize, ToSchema)]
pub struct SendMessageResponse {
    /// Sending device.
    pub device_id: String,
    /// Protocol message ID; receipts for it arrive on the event stream.
    pub message_id: String,
    /// Recipient echoed from the request.
    pub to: String,
    /// Time the message was handed to the protocol client.
    pub sent_at: DateTime<Utc>,
}
