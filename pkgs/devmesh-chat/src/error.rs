//! Error types for the chat core

use thiserror::Error;

/// Errors that can occur in chat operations
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),
    #[error("Message not found: {0}")]
    MessageNotFound(String),
    #[error("User {0} is not a participant of this conversation")]
    NotAParticipant(String),
    #[error("Message text is empty")]
    EmptyMessage,
    #[error("No accepted connection between {0} and {1}")]
    NotConnected(String, String),
    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ChatError>;
