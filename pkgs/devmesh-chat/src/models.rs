//! Domain entities shared across the chat subsystem.
//!
//! User and connection-edge records are owned upstream; the chat core only
//! reads them (and writes the denormalized presence fields on the user).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a connection request between two users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Interested,
    Ignored,
    Accepted,
    Rejected,
}

/// Directed connection-request edge between two users.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionEdge {
    pub from_user: String,
    pub to_user: String,
    pub status: ConnectionStatus,
}

/// The slice of the user record the chat subsystem reads and writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub is_online: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(id: impl Into<String>, first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            is_online: false,
            last_seen: None,
        }
    }
}

/// A single message inside a conversation.
///
/// Immutable after creation except for the one allowed transition
/// seen `false` -> `true`, which also stamps `seen_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub text: String,
    pub sent_at: DateTime<Utc>,
    pub seen: bool,
    pub seen_at: Option<DateTime<Utc>>,
}

/// Persisted record of all messages between exactly two participants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    /// Stored in canonical (sorted) order so {A,B} and {B,A} compare equal.
    pub participants: [String; 2],
    /// Insertion order is chronological order; append-only.
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn is_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }
}
