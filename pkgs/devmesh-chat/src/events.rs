//! Wire protocol for the socket layer.
//!
//! Events use externally-tagged JSON (`{"event": "sendMessage", "data": ...}`)
//! with camelCase payload fields, matching what the web client emits. Two
//! top-level enums cover the client-to-server and server-to-client
//! directions.
//!
//! Payload fields default to empty strings when absent so the dispatcher can
//! treat "missing" and "empty" uniformly: a required field that is empty
//! makes the whole event a silent no-op.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Events received from connected clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// Bind a user identity to this connection and go online.
    UserOnline {
        #[serde(default)]
        user_id: String,
    },
    /// Join the broadcast room shared with one peer.
    JoinChat {
        #[serde(default)]
        user_id: String,
        #[serde(default)]
        target_id: String,
    },
    /// Send a text message to a peer.
    SendMessage {
        #[serde(default)]
        first_name: String,
        #[serde(default)]
        last_name: String,
        #[serde(default)]
        user_id: String,
        #[serde(default)]
        target_id: String,
        #[serde(default)]
        text: String,
    },
    /// Mark a stored message as seen.
    MessageSeen {
        #[serde(default)]
        chat_id: String,
        #[serde(default)]
        message_id: String,
        #[serde(default)]
        user_id: String,
        #[serde(default)]
        target_id: String,
    },
}

/// Events pushed to connected clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// A user's presence changed. Broadcast to every connection.
    UserStatus {
        user_id: String,
        is_online: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_seen: Option<DateTime<Utc>>,
    },
    /// A message was persisted and delivered to the room. The internal
    /// message id is deliberately not part of this payload.
    MessageReceived {
        first_name: String,
        last_name: String,
        text: String,
        sent_at: DateTime<Utc>,
        sender_id: String,
    },
    /// A message transitioned to seen. Broadcast to the room.
    MessageSeen {
        message_id: String,
        seen_at: DateTime<Utc>,
    },
    /// A send was refused because no accepted connection exists. Sent to
    /// the sender only.
    MessageRejected {
        target_id: String,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_wire_names() {
        let json = r#"{"event":"sendMessage","data":{"firstName":"Ada","lastName":"L","userId":"u1","targetId":"u2","text":"hi"}}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        match event {
            ClientEvent::SendMessage { user_id, target_id, text, .. } => {
                assert_eq!(user_id, "u1");
                assert_eq!(target_id, "u2");
                assert_eq!(text, "hi");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_missing_fields_default_to_empty() {
        let json = r#"{"event":"joinChat","data":{"userId":"u1"}}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        match event {
            ClientEvent::JoinChat { user_id, target_id } => {
                assert_eq!(user_id, "u1");
                assert!(target_id.is_empty());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_user_status_skips_absent_last_seen() {
        let event = ServerEvent::UserStatus {
            user_id: "u1".into(),
            is_online: true,
            last_seen: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""event":"userStatus""#));
        assert!(!json.contains("lastSeen"));
    }
}
