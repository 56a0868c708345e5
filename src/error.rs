//! Gateway error types with HTTP status code mapping.
//!
//! [`GatewayError`] is the central error type for the gateway. Each variant
//! maps to a specific HTTP status code and structured JSON error response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::ConnectionStatus;
use crate::protocol::FailureClass;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2001,
///     "message": "device not found: 34600111222@s.whatsapp.net",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see code ranges on [`GatewayError`]).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category        | HTTP Status                          |
/// |-----------|-----------------|--------------------------------------|
/// | 1000–1999 | Validation      | 400 Bad Request                      |
/// | 2000–2999 | State/Not Found | 404 Not Found / 409 Conflict         |
/// | 3000–3999 | Server          | 500 Internal / 503 Unavailable       |
/// | 4000–4999 | Protocol        | 502 Bad Gateway                      |
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Device with the given ID is not in the store.
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// The device already has a connecting or connected session.
    #[error("session already active for device {0}")]
    SessionAlreadyActive(String),

    /// The operation needs a connected session and the device has none.
    #[error("device {0} is not connected")]
    SessionNotConnected(String),

    /// A session state change not allowed by the state machine.
    #[error("invalid session transition from {from} to {to}")]
    InvalidTransition {
        /// Status before the attempted change.
        from: ConnectionStatus,
        /// Requested status.
        to: ConnectionStatus,
    },

    /// The protocol client failed to connect.
    #[error("device {device_id} failed to connect ({}): {reason}", .class.as_str())]
    ConnectFailed {
        /// Device that failed.
        device_id: String,
        /// Whether the failure purged the stored device.
        class: FailureClass,
        /// Error reported by the protocol client.
        reason: String,
    },

    /// The protocol client rejected an outgoing message.
    #[error("device {device_id} failed to send message: {reason}")]
    SendFailed {
        /// Sending device.
        device_id: String,
        /// Error reported by the protocol client.
        reason: String,
    },

    /// Shutdown has begun; no new sessions are accepted.
    #[error("gateway is shutting down")]
    ShuttingDown,

    /// Persistence layer failure.
    #[error("persistence error: {0}")]
    PersistenceError(String),
}

impl GatewayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::DeviceNotFound(_) => 2001,
            Self::SessionAlreadyActive(_) => 2002,
            Self::SessionNotConnected(_) => 2003,
            Self::PersistenceError(_) => 3001,
            Self::InvalidTransition { .. } => 3002,
            Self::ShuttingDown => 3003,
            Self::ConnectFailed {
                class: FailureClass::Fatal,
                ..
            } => 4001,
            Self::ConnectFailed {
                class: FailureClass::Transient,
                ..
            } => 4002,
            Self::SendFailed { .. } => 4003,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::DeviceNotFound(_) => StatusCode::NOT_FOUND,
            Self::SessionAlreadyActive(_) | Self::SessionNotConnected(_) => StatusCode::CONFLICT,
            Self::ConnectFailed { .. } | Self::SendFailed { .. } => StatusCode::BAD_GATEWAY,
            Self::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            Self::InvalidTransition { .. } | Self::PersistenceError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns the failure class if this is a connect failure.
    #[must_use]
    pub const fn failure_class(&self) -> Option<FailureClass> {
        match self {
            Self::ConnectFailed { class, .. } => Some(*class),
            _ => None,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
