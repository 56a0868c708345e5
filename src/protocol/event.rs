//! Inbound events reported by protocol clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event pushed by a protocol client through its event handler.
///
/// The gateway does not interpret message content; it only tags events with
/// their device and forwards them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProtocolEvent {
    /// A chat message was received (or sent from another linked device).
    Message {
        /// Protocol message identifier.
        message_id: String,
        /// Sender address.
        from: String,
        /// Recipient or chat address.
        to: String,
        /// Plain-text body, empty for media-only messages.
        #[serde(default)]
        text: String,
        /// Downloaded media (image, document, audio), if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attachment: Option<Attachment>,
        /// Server timestamp of the message.
        timestamp: DateTime<Utc>,
    },

    /// Delivery or read receipt for previously sent messages.
    Receipt {
        /// Messages the receipt refers to.
        message_ids: Vec<String>,
        /// Address that produced the receipt.
        from: String,
        /// Receipt type (e.g. `"delivered"`, `"read"`).
        receipt_type: String,
        /// Receipt timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Presence update for a contact.
    Presence {
        /// Contact address.
        from: String,
        /// Whether the contact is online.
        available: bool,
        /// Last-seen time, when reported.
        #[serde(default)]
        last_seen: Option<DateTime<Utc>>,
    },

    /// The client finished connecting.
    Connected,

    /// The client lost its connection.
    Disconnected,

    /// The server logged the device out.
    LoggedOut {
        /// Reason reported by the server.
        reason: String,
    },

    /// Any other event, forwarded as-is.
    Other {
        /// Library-specific event name.
        name: String,
        /// Raw event payload.
        #[serde(default)]
        payload: serde_json::Value,
    },
}

/// Media carried by a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Original file name, when the sender provided one.
    #[serde(default)]
    pub filename: Option<String>,
    /// MIME type reported by the protocol.
    #[serde(default)]
    pub mime_type: Option<String>,
    /// File contents, base64-encoded. Passed through untouched.
    pub data: String,
}

impl ProtocolEvent {
    /// Returns the event kind discriminator.
    #[must_use]
    pub const fn kind_str(&self) -> &'static str {
        match self {
            Self::Message { .. } => "message",
            Self::Receipt { .. } => "receipt",
            Self::Presence { .. } => "presence",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::LoggedOut { .. } => "logged_out",
            Self::Other { .. } => "other",
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_message_without_text() {
        let json = r#"{
            "kind": "message",
            "message_id": "3EB0",
            "from": "34600111222@s.whatsapp.net",
            "to": "34600333444@s.whatsapp.net",
            "timestamp": "2025-01-01T10:00:00Z"
        }"#;
        let Ok(event) = serde_json::from_str::<ProtocolEvent>(json) else {
            panic!("failed to parse message event");
        };
        let ProtocolEvent::Message { text, .. } = &event else {
            panic!("expected message");
        };
        assert!(text.is_empty());
        assert_eq!(event.kind_str(), "message");
    }

    #[test]
    fn media_message_keeps_attachment() {
        let json = r#"{
            "kind": "message",
            "message_id": "3EB1",
            "from": "34600111222@s.whatsapp.net",
            "to": "34600333444@s.whatsapp.net",
            "attachment": {"filename": "factura.pdf", "mime_type": "application/pdf", "data": "JVBERi0="},
            "timestamp": "2025-01-01T10:00:00Z"
        }"#;
        let Ok(event) = serde_json::from_str::<ProtocolEvent>(json) else {
            panic!("failed to parse media message");
        };
        let ProtocolEvent::Message {
            attachment: Some(attachment),
            ..
        } = &event
        else {
            panic!("expected message with attachment");
        };
        assert_eq!(attachment.filename.as_deref(), Some("factura.pdf"));
        assert_eq!(attachment.data, "JVBERi0=");

        let Ok(value) = serde_json::to_value(&event) else {
            panic!("serialization failed");
        };
        let filename = value
            .get("attachment")
            .and_then(|a| a.get("filename"))
            .and_then(|f| f.as_str());
        assert_eq!(filename, Some("factura.pdf"));
    }

    #[test]
    fn kind_matches_serde_tag() {
        let events = [
            ProtocolEvent::Connected,
            ProtocolEvent::Disconnected,
            ProtocolEvent::LoggedOut {
                reason: "401".into(),
            },
            ProtocolEvent::Presence {
                from: "x".into(),
                available: true,
                last_seen: None,
            },
        ];
        for event in events {
            let Ok(value) = serde_json::to_value(&event) else {
                panic!("serialization failed");
            };
            assert_eq!(
                value.get("kind").and_then(|k| k.as_str()),
                Some(event.kind_str())
            );
        }
    }
}
