//! Message store adapter.
//!
//! Owns persisted conversation state: one conversation per unordered
//! participant pair, each holding an append-only message sequence. The
//! dispatch core talks to the [`ChatStore`] trait so deployments can swap
//! the in-memory store for a durable one.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::error::{ChatError, Result};
use crate::models::{Conversation, Message};
use crate::room::canonical_pair;

/// Persistence seam for conversations and messages.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Look up the conversation for an unordered participant pair, creating
    /// an empty one when absent. `{a,b}` and `{b,a}` resolve to the same
    /// conversation.
    async fn find_or_create(&self, a: &str, b: &str) -> Result<Conversation>;

    /// Load a conversation by id, messages included.
    async fn conversation(&self, conversation_id: &str) -> Result<Conversation>;

    /// Append a message. The sender must be a participant and the text
    /// non-empty; the store assigns id and timestamp.
    async fn append_message(&self, conversation_id: &str, sender_id: &str, text: &str) -> Result<Message>;

    /// Flip a message to seen, stamping `seen_at`. Returns `None` when the
    /// message was already seen (idempotent no-op). Errors when the
    /// conversation or message does not exist.
    async fn mark_seen(&self, conversation_id: &str, message_id: &str) -> Result<Option<Message>>;
}

#[derive(Default)]
struct MemoryState {
    /// Canonical pair -> conversation id. Lookups always go through the
    /// normalized pair, never through document identity.
    by_pair: HashMap<(String, String), String>,
    conversations: HashMap<String, Conversation>,
}

/// In-memory [`ChatStore`]. A single lock serializes first-contact, so two
/// participants opening the same chat concurrently cannot create a
/// duplicate pair.
#[derive(Default)]
pub struct MemoryChatStore {
    state: Mutex<MemoryState>,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn find_or_create(&self, a: &str, b: &str) -> Result<Conversation> {
        let (lo, hi) = canonical_pair(a, b);
        let key = (lo.to_string(), hi.to_string());

        let mut state = self.state.lock();
        if let Some(id) = state.by_pair.get(&key) {
            let conversation = state.conversations[id].clone();
            return Ok(conversation);
        }

        let conversation = Conversation {
            id: Uuid::new_v4().to_string(),
            participants: [lo.to_string(), hi.to_string()],
            messages: Vec::new(),
        };
        debug!("Created conversation {} for pair ({lo}, {hi})", conversation.id);
        state.by_pair.insert(key, conversation.id.clone());
        state
            .conversations
            .insert(conversation.id.clone(), conversation.clone());
        Ok(conversation)
    }

    async fn conversation(&self, conversation_id: &str) -> Result<Conversation> {
        self.state
            .lock()
            .conversations
            .get(conversation_id)
            .cloned()
            .ok_or_else(|| ChatError::ConversationNotFound(conversation_id.to_string()))
    }

    async fn append_message(&self, conversation_id: &str, sender_id: &str, text: &str) -> Result<Message> {
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let mut state = self.state.lock();
        let conversation = state
            .conversations
            .get_mut(conversation_id)
            .ok_or_else(|| ChatError::ConversationNotFound(conversation_id.to_string()))?;
        if !conversation.is_participant(sender_id) {
            return Err(ChatError::NotAParticipant(sender_id.to_string()));
        }

        let message = Message {
            id: Uuid::new_v4().to_string(),
            sender_id: sender_id.to_string(),
            text: text.to_string(),
            sent_at: Utc::now(),
            seen: false,
            seen_at: None,
        };
        conversation.messages.push(message.clone());
        debug!("Appended message {} to conversation {conversation_id}", message.id);
        Ok(message)
    }

    async fn mark_seen(&self, conversation_id: &str, message_id: &str) -> Result<Option<Message>> {
        let mut state = self.state.lock();
        let conversation = state
            .conversations
            .get_mut(conversation_id)
            .ok_or_else(|| ChatError::ConversationNotFound(conversation_id.to_string()))?;
        let message = conversation
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| ChatError::MessageNotFound(message_id.to_string()))?;

        if message.seen {
            return Ok(None);
        }
        message.seen = true;
        message.seen_at = Some(Utc::now());
        Ok(Some(message.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pair_lookup_is_order_independent() {
        let store = MemoryChatStore::new();
        let first = store.find_or_create("alice", "bob").await.unwrap();
        let second = store.find_or_create("bob", "alice").await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_append_and_history() {
        let store = MemoryChatStore::new();
        let conversation = store.find_or_create("alice", "bob").await.unwrap();

        store.append_message(&conversation.id, "alice", "hi").await.unwrap();
        store.append_message(&conversation.id, "bob", "hello").await.unwrap();

        let loaded = store.conversation(&conversation.id).await.unwrap();
        assert_eq!(loaded.messages.len(), 2);
        assert_eq!(loaded.messages[0].text, "hi");
        assert_eq!(loaded.messages[1].text, "hello");
        assert!(!loaded.messages[0].seen);
        assert!(loaded.messages[0].seen_at.is_none());
    }

    #[tokio::test]
    async fn test_append_rejects_outsiders_and_empty_text() {
        let store = MemoryChatStore::new();
        let conversation = store.find_or_create("alice", "bob").await.unwrap();

        let err = store
            .append_message(&conversation.id, "mallory", "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::NotAParticipant(_)));

        let err = store
            .append_message(&conversation.id, "alice", "")
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::EmptyMessage));
    }

    #[tokio::test]
    async fn test_mark_seen_is_idempotent() {
        let store = MemoryChatStore::new();
        let conversation = store.find_or_create("alice", "bob").await.unwrap();
        let message = store
            .append_message(&conversation.id, "alice", "hi")
            .await
            .unwrap();

        let first = store.mark_seen(&conversation.id, &message.id).await.unwrap();
        let seen_at = first.expect("first call transitions").seen_at;
        assert!(seen_at.is_some());

        let second = store.mark_seen(&conversation.id, &message.id).await.unwrap();
        assert!(second.is_none());

        let loaded = store.conversation(&conversation.id).await.unwrap();
        assert_eq!(loaded.messages[0].seen_at, seen_at);
    }

    #[tokio::test]
    async fn test_mark_seen_reports_missing_ids() {
        let store = MemoryChatStore::new();
        let conversation = store.find_or_create("alice", "bob").await.unwrap();

        let err = store.mark_seen("nope", "nope").await.unwrap_err();
        assert!(matches!(err, ChatError::ConversationNotFound(_)));

        let err = store.mark_seen(&conversation.id, "nope").await.unwrap_err();
        assert!(matches!(err, ChatError::MessageNotFound(_)));
    }

    #[tokio::test]
    async fn test_concurrent_first_contact_creates_one_conversation() {
        use std::sync::Arc;

        let store = Arc::new(MemoryChatStore::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.find_or_create("alice", "bob").await.unwrap().id
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
    }
}
