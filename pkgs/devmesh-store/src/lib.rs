//! devmesh-store - SQLite-backed storage for the devmesh chat backend
//!
//! Durable implementations of the `devmesh-chat` storage traits:
//!
//! - [`SqliteChatStore`]: conversations and messages, one conversation per
//!   unordered participant pair enforced by a UNIQUE key on the normalized
//!   pair
//! - [`SqliteUserStore`]: user records with the denormalized
//!   `is_online`/`last_seen` presence fields
//! - [`SqliteEdgeStore`]: connection-request edges consumed by the
//!   authorization gate
//!
//! All stores share one connection behind a mutex; SQLite serializes the
//! writes, which also covers the concurrent first-contact race on
//! `find_or_create`.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::Connection;
use tracing::info;

mod chat_store;
mod user_store;

pub use chat_store::SqliteChatStore;
pub use user_store::{SqliteEdgeStore, SqliteUserStore};

/// Shared handle to the SQLite database.
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database at `path` and run the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(&path).context("Failed to open chat database")?;
        Self::create_tables(&conn)?;
        info!("Chat database ready at {}", path.as_ref().display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::create_tables(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn create_tables(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL DEFAULT '',
                is_online INTEGER NOT NULL DEFAULT 0,
                last_seen INTEGER
            );

            CREATE TABLE IF NOT EXISTS connection_edges (
                from_user TEXT NOT NULL,
                to_user TEXT NOT NULL,
                status TEXT NOT NULL,
                PRIMARY KEY (from_user, to_user)
            );

            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT NOT NULL UNIQUE,
                pair_key TEXT PRIMARY KEY,
                user_lo TEXT NOT NULL,
                user_hi TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                sender_id TEXT NOT NULL,
                text TEXT NOT NULL,
                sent_at INTEGER NOT NULL,
                seen INTEGER NOT NULL DEFAULT 0,
                seen_at INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id);
            CREATE INDEX IF NOT EXISTS idx_edges_reverse ON connection_edges(to_user, from_user);
            "#,
        )
        .context("Failed to create schema")?;
        Ok(())
    }

    pub fn chat_store(&self) -> SqliteChatStore {
        SqliteChatStore::new(self.conn.clone())
    }

    pub fn user_store(&self) -> SqliteUserStore {
        SqliteUserStore::new(self.conn.clone())
    }

    pub fn edge_store(&self) -> SqliteEdgeStore {
        SqliteEdgeStore::new(self.conn.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_open_creates_schema_idempotently() {
        let file = NamedTempFile::new().unwrap();
        Database::open(file.path()).unwrap();
        // Re-opening an existing database must not fail.
        Database::open(file.path()).unwrap();
    }
}
