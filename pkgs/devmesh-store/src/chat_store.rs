//! SQLite implementation of the conversation/message store.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;
use uuid::Uuid;

use devmesh_chat::error::{ChatError, Result};
use devmesh_chat::models::{Conversation, Message};
use devmesh_chat::room::canonical_pair;
use devmesh_chat::store::ChatStore;

pub struct SqliteChatStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteChatStore {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn load_messages(conn: &Connection, conversation_id: &str) -> Result<Vec<Message>> {
        let mut stmt = conn
            .prepare(
                "SELECT id, sender_id, text, sent_at, seen, seen_at
                 FROM messages WHERE conversation_id = ?1 ORDER BY rowid ASC",
            )
            .context("Failed to prepare message query")?;
        let messages = stmt
            .query_map(params![conversation_id], Self::row_to_message)
            .context("Failed to query messages")?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()
            .context("Failed to read messages")?;
        Ok(messages)
    }

    fn row_to_message(row: &Row) -> std::result::Result<Message, rusqlite::Error> {
        Ok(Message {
            id: row.get(0)?,
            sender_id: row.get(1)?,
            text: row.get(2)?,
            sent_at: DateTime::from_timestamp_millis(row.get(3)?)
                .ok_or(rusqlite::Error::InvalidQuery)?
                .with_timezone(&Utc),
            seen: row.get(4)?,
            seen_at: row
                .get::<_, Option<i64>>(5)?
                .map(|t| DateTime::from_timestamp_millis(t).ok_or(rusqlite::Error::InvalidQuery))
                .transpose()?
                .map(|dt| dt.with_timezone(&Utc)),
        })
    }

    /// Current time truncated to the millisecond precision the schema
    /// stores, so returned values match what a reload will produce.
    fn now_millis() -> DateTime<Utc> {
        let now = Utc::now();
        DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
    }

    fn participants(conn: &Connection, conversation_id: &str) -> Result<[String; 2]> {
        conn.query_row(
            "SELECT user_lo, user_hi FROM conversations WHERE id = ?1",
            params![conversation_id],
            |row| Ok([row.get::<_, String>(0)?, row.get::<_, String>(1)?]),
        )
        .optional()
        .context("Failed to query conversation")?
        .ok_or_else(|| ChatError::ConversationNotFound(conversation_id.to_string()))
    }
}

#[async_trait]
impl ChatStore for SqliteChatStore {
    async fn find_or_create(&self, a: &str, b: &str) -> Result<Conversation> {
        let (lo, hi) = canonical_pair(a, b);
        let pair_key = format!("{lo}:{hi}");
        let conn = self.conn.lock();

        // The UNIQUE pair key makes concurrent first-contact collapse onto
        // one row; the loser of the race just reads the winner's id.
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO conversations (id, pair_key, user_lo, user_hi)
                 VALUES (?1, ?2, ?3, ?4)",
                params![Uuid::new_v4().to_string(), pair_key, lo, hi],
            )
            .context("Failed to insert conversation")?;

        let id: String = conn
            .query_row(
                "SELECT id FROM conversations WHERE pair_key = ?1",
                params![pair_key],
                |row| row.get(0),
            )
            .context("Failed to look up conversation")?;
        if inserted > 0 {
            debug!("Created conversation {id} for pair ({lo}, {hi})");
        }

        let messages = Self::load_messages(&conn, &id)?;
        Ok(Conversation {
            id,
            participants: [lo.to_string(), hi.to_string()],
            messages,
        })
    }

    async fn conversation(&self, conversation_id: &str) -> Result<Conversation> {
        let conn = self.conn.lock();
        let participants = Self::participants(&conn, conversation_id)?;
        let messages = Self::load_messages(&conn, conversation_id)?;
        Ok(Conversation {
            id: conversation_id.to_string(),
            participants,
            messages,
        })
    }

    async fn append_message(&self, conversation_id: &str, sender_id: &str, text: &str) -> Result<Message> {
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let conn = self.conn.lock();
        let participants = Self::participants(&conn, conversation_id)?;
        if !participants.iter().any(|p| p == sender_id) {
            return Err(ChatError::NotAParticipant(sender_id.to_string()));
        }

        let message = Message {
            id: Uuid::new_v4().to_string(),
            sender_id: sender_id.to_string(),
            text: text.to_string(),
            sent_at: Self::now_millis(),
            seen: false,
            seen_at: None,
        };
        conn.execute(
            "INSERT INTO messages (id, conversation_id, sender_id, text, sent_at, seen, seen_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, NULL)",
            params![
                message.id,
                conversation_id,
                message.sender_id,
                message.text,
                message.sent_at.timestamp_millis(),
            ],
        )
        .context("Failed to store message")?;
        debug!("Appended message {} to conversation {conversation_id}", message.id);
        Ok(message)
    }

    async fn mark_seen(&self, conversation_id: &str, message_id: &str) -> Result<Option<Message>> {
        let conn = self.conn.lock();

        let existing = conn
            .query_row(
                "SELECT id, sender_id, text, sent_at, seen, seen_at
                 FROM messages WHERE id = ?1 AND conversation_id = ?2",
                params![message_id, conversation_id],
                Self::row_to_message,
            )
            .optional()
            .context("Failed to query message")?;
        let Some(mut message) = existing else {
            // Distinguish a missing conversation from a missing message.
            Self::participants(&conn, conversation_id)?;
            return Err(ChatError::MessageNotFound(message_id.to_string()));
        };

        if message.seen {
            return Ok(None);
        }

        let seen_at = Self::now_millis();
        conn.execute(
            "UPDATE messages SET seen = 1, seen_at = ?1 WHERE id = ?2",
            params![seen_at.timestamp_millis(), message_id],
        )
        .context("Failed to mark message seen")?;
        message.seen = true;
        message.seen_at = Some(seen_at);
        Ok(Some(message))
    }
}
