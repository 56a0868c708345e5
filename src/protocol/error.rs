//! Protocol client errors and their fatal/transient classification.
//!
//! Protocol libraries frequently report connect failures only as text. All
//! text matching lives in [`ProtocolError::from_message`], driven by the
//! [`KNOWN_FAILURES`] table; the rest of the crate only looks at the typed
//! variants and [`ProtocolError::class`].

use serde::Serialize;

/// Whether a failed connect invalidates the stored session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// The stored credentials are unusable. The device must be purged.
    Fatal,
    /// The device stays in the store and may be retried later.
    Transient,
}

impl FailureClass {
    /// Lowercase name used in logs and API payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fatal => "fatal",
            Self::Transient => "transient",
        }
    }
}

/// Error reported by a protocol client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The server rejected the stored credentials.
    #[error("authentication rejected: {0}")]
    AuthRejected(String),

    /// The account was logged out from another device.
    #[error("logged out from another device: {0}")]
    LoggedOutElsewhere(String),

    /// A user-sync query could not be sent, leaving the session unusable.
    #[error("unsynchronized query failure: {0}")]
    UnsyncedQuery(String),

    /// Transport-level failure (DNS, TCP, TLS, WebSocket).
    #[error("network error: {0}")]
    Network(String),

    /// The operation did not complete in time.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The client is not connected.
    #[error("not connected")]
    NotConnected,

    /// Any other failure reported by the protocol library.
    #[error("{0}")]
    Other(String),
}

/// Kind of a recognised raw library error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownFailure {
    /// Maps to [`ProtocolError::AuthRejected`].
    AuthRejected,
    /// Maps to [`ProtocolError::LoggedOutElsewhere`].
    LoggedOutElsewhere,
    /// Maps to [`ProtocolError::UnsyncedQuery`].
    UnsyncedQuery,
}

/// Raw library messages that identify an invalidated session.
pub const KNOWN_FAILURES: &[(&str, KnownFailure)] = &[
    ("server responded with 401", KnownFailure::AuthRejected),
    (
        "got 401: logged out from another device connect failure",
        KnownFailure::LoggedOutElsewhere,
    ),
    (
        "failed to send usync query: websocket not connected",
        KnownFailure::UnsyncedQuery,
    ),
];

impl ProtocolError {
    /// Builds a typed error from a raw library message.
    ///
    /// Messages listed in [`KNOWN_FAILURES`] (exact match, surrounding
    /// whitespace ignored) become their typed variant; everything else is
    /// [`ProtocolError::Other`].
    #[must_use]
    pub fn from_message(message: &str) -> Self {
        let trimmed = message.trim();
        let known = KNOWN_FAILURES
            .iter()
            .find(|(text, _)| *text == trimmed)
            .map(|(_, kind)| *kind);
        let message = trimmed.to_string();
        match known {
            Some(KnownFailure::AuthRejected) => Self::AuthRejected(message),
            Some(KnownFailure::LoggedOutElsewhere) => Self::LoggedOutElsewhere(message),
            Some(KnownFailure::UnsyncedQuery) => Self::UnsyncedQuery(message),
            None => Self::Other(message),
        }
    }

    /// Classifies the error for the connect failure policy.
    #[must_use]
    pub const fn class(&self) -> FailureClass {
        match self {
            Self::AuthRejected(_) | Self::LoggedOutElsewhere(_) | Self::UnsyncedQuery(_) => {
                FailureClass::Fatal
            }
            Self::Network(_) | Self::Timeout(_) | Self::NotConnected | Self::Other(_) => {
                FailureClass::Transient
            }
        }
    }

    /// Returns `true` if the stored session must be purged.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self.class(), FailureClass::Fatal)
    }
}
