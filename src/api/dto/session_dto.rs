//! Session DTOs for the session listing and connect endpoints.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::Session;

/// One device session as seen by API clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionDto {
    /// Device identifier (e.g. `"34600111222:3@s.whatsapp.net"`).
    pub device_id: String,
    /// `disconnected`, `connecting`, `connected` or `failed`.
    pub status: String,
    /// Error of the last failed connect attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// `fatal` or `transient`, when the session failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_class: Option<String>,
    /// Time of the last status change.
    pub updated_at: DateTime<Utc>,
}

impl From<Session> for SessionDto {
    fn from(s: Session) -> Self {
        Self {
            device_id: s.device_id.into(),
            status: s.status.as_str().to_string(),
            last_error: s.last_error,
            failure_class: s.failure_class.map(|c| c.as_str().to_string()),
            updated_at: s.updated_at,
        }
    }
}

/// Response body for `GET /api/v1/sessions`.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionListResponse {
    /// Sessions in the active set (connecting or connected).
    pub active: Vec<SessionDto>,
    /// Devices that failed to connect during this boot cycle.
    pub failures: Vec<SessionDto>,
}
