//! Health check DTO.

use serde::Serialize;
use utoipa::ToSchema;

/// Response body for `GET /health`.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// `healthy`, or `shutting_down` once shutdown has begun.
    pub status: String,
    /// RFC 3339 server time.
    pub timestamp: String,
    /// Crate version.
    pub version: String,
    /// Number of connected sessions.
    pub active_sessions: usize,
    /// Number of open event streams.
    pub subscribers: usize,
}
