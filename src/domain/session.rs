//! Runtime session state for a single device.
//!
//! A [`Session`] binds one persisted device to one protocol client for the
//! lifetime of a boot cycle. Its [`ConnectionStatus`] follows a small state
//! machine:
//!
//! ```text
//! Disconnected ──► Connecting ──► Connected ──► Disconnected
//!                       │
//!                       └──────► Failed (terminal for this boot)
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::DeviceId;
use crate::error::GatewayError;
use crate::protocol::FailureClass;

/// Connection status of a device session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// No client is attached, or it was torn down.
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// The client is connected and its events are being broadcast.
    Connected,
    /// The connect attempt failed. Terminal for the current boot cycle.
    Failed,
}

impl ConnectionStatus {
    /// Returns `true` if moving from `self` to `next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Disconnected, Self::Connecting)
                | (Self::Connecting, Self::Connected)
                | (Self::Connecting, Self::Failed)
                | (Self::Connected, Self::Disconnected)
        )
    }

    /// Lowercase name used in logs and API payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one device's session.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    /// Device this session belongs to.
    pub device_id: DeviceId,
    /// Current connection status.
    pub status: ConnectionStatus,
    /// Error message of the last failed connect attempt.
    pub last_error: Option<String>,
    /// Classification of the last failure, if any.
    pub failure_class: Option<FailureClass>,
    /// Timestamp of the last status change.
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Creates a new session in the [`ConnectionStatus::Disconnected`] state.
    #[must_use]
    pub fn new(device_id: DeviceId) -> Self {
        Self {
            device_id,
            status: ConnectionStatus::Disconnected,
            last_error: None,
            failure_class: None,
            updated_at: Utc::now(),
        }
    }

    /// Moves the session to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidTransition`] if the state machine does
    /// not allow the transition.
    pub fn transition(&mut self, next: ConnectionStatus) -> Result<(), GatewayError> {
        if !self.status.can_transition_to(next) {
            return Err(GatewayError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Marks the session as failed with the given reason and classification.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidTransition`] unless the session is
    /// currently connecting.
    pub fn fail(&mut self, reason: String, class: FailureClass) -> Result<(), GatewayError> {
        self.transition(ConnectionStatus::Failed)?;
        self.last_error = Some(reason);
        self.failure_class = Some(class);
        Ok(())
    }

    /// Returns `true` if the session is connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(DeviceId::from("a@s.whatsapp.net"))
    }

    #[test]
    fn new_session_is_disconnected() {
        let s = session();
        assert_eq!(s.status, ConnectionStatus::Disconnected);
        assert!(s.last_error.is_none());
    }

    #[test]
    fn happy_path_transitions() {
        let mut s = session();
        assert!(s.transition(ConnectionStatus::Connecting).is_ok());
        assert!(s.transition(ConnectionStatus::Connected).is_ok());
        assert!(s.is_connected());
        assert!(s.transition(ConnectionStatus::Disconnected).is_ok());
    }

    #[test]
    fn failed_is_terminal() {
        let mut s = session();
        assert!(s.transition(ConnectionStatus::Connecting).is_ok());
        assert!(s.fail("boom".to_string(), FailureClass::Transient).is_ok());
        assert_eq!(s.last_error.as_deref(), Some("boom"));
        assert_eq!(s.failure_class, Some(FailureClass::Transient));

        for next in [
            ConnectionStatus::Disconnected,
            ConnectionStatus::Connecting,
            ConnectionStatus::Connected,
        ] {
            assert!(s.transition(next).is_err());
        }
    }

    #[test]
    fn cannot_skip_connecting() {
        let mut s = session();
        let result = s.transition(ConnectionStatus::Connected);
        let Err(GatewayError::InvalidTransition { from, to }) = result else {
            panic!("expected invalid transition");
        };
        assert_eq!(from, ConnectionStatus::Disconnected);
        assert_eq!(to, ConnectionStatus::Connected);
    }

    #[test]
    fn fail_requires_connecting() {
        let mut s = session();
        assert!(s.fail("x".to_string(), FailureClass::Fatal).is_err());
        assert!(s.last_error.is_none());
    }
}
