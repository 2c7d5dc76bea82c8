//! SQLite implementations of the user and connection-edge seams.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use devmesh_chat::error::Result;
use devmesh_chat::models::{ConnectionStatus, User};
use devmesh_chat::users::{EdgeStore, UserStore};

pub struct SqliteUserStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteUserStore {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Insert or replace a full user record. The wider system owns user
    /// creation; this exists for seeding and tests.
    pub fn upsert(&self, user: &User) -> Result<()> {
        self.conn
            .lock()
            .execute(
                "INSERT OR REPLACE INTO users (id, first_name, last_name, is_online, last_seen)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    user.id,
                    user.first_name,
                    user.last_name,
                    user.is_online,
                    user.last_seen.map(|t| t.timestamp_millis()),
                ],
            )
            .context("Failed to upsert user")?;
        Ok(())
    }
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn get(&self, user_id: &str) -> Result<Option<User>> {
        let user = self
            .conn
            .lock()
            .query_row(
                "SELECT id, first_name, last_name, is_online, last_seen FROM users WHERE id = ?1",
                params![user_id],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        first_name: row.get(1)?,
                        last_name: row.get(2)?,
                        is_online: row.get(3)?,
                        last_seen: row
                            .get::<_, Option<i64>>(4)?
                            .map(|t| {
                                DateTime::from_timestamp_millis(t).ok_or(rusqlite::Error::InvalidQuery)
                            })
                            .transpose()?
                            .map(|dt| dt.with_timezone(&Utc)),
                    })
                },
            )
            .optional()
            .context("Failed to query user")?;
        Ok(user)
    }

    async fn set_online(&self, user_id: &str, is_online: bool, last_seen: Option<DateTime<Utc>>) -> Result<()> {
        // COALESCE keeps the previous last_seen when none is provided.
        let updated = self
            .conn
            .lock()
            .execute(
                "UPDATE users SET is_online = ?1, last_seen = COALESCE(?2, last_seen) WHERE id = ?3",
                params![is_online, last_seen.map(|t| t.timestamp_millis()), user_id],
            )
            .context("Failed to update presence fields")?;
        if updated == 0 {
            debug!("Presence update for unknown user {user_id} ignored");
        }
        Ok(())
    }
}

pub struct SqliteEdgeStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteEdgeStore {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Create or overwrite the edge for a directed pair. Edge lifecycle is
    /// owned upstream; this exists for seeding and tests.
    pub fn set_edge(&self, from_user: &str, to_user: &str, status: ConnectionStatus) -> Result<()> {
        let status = match status {
            ConnectionStatus::Interested => "interested",
            ConnectionStatus::Ignored => "ignored",
            ConnectionStatus::Accepted => "accepted",
            ConnectionStatus::Rejected => "rejected",
        };
        self.conn
            .lock()
            .execute(
                "INSERT OR REPLACE INTO connection_edges (from_user, to_user, status)
                 VALUES (?1, ?2, ?3)",
                params![from_user, to_user, status],
            )
            .context("Failed to store connection edge")?;
        Ok(())
    }
}

#[async_trait]
impl EdgeStore for SqliteEdgeStore {
    async fn accepted_between(&self, a: &str, b: &str) -> Result<bool> {
        let accepted: bool = self
            .conn
            .lock()
            .query_row(
                "SELECT EXISTS(
                    SELECT 1 FROM connection_edges
                    WHERE status = 'accepted'
                      AND ((from_user = ?1 AND to_user = ?2)
                        OR (from_user = ?2 AND to_user = ?1))
                 )",
                params![a, b],
                |row| row.get(0),
            )
            .context("Failed to query connection edges")?;
        Ok(accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    #[tokio::test]
    async fn test_presence_fields_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let users = db.user_store();
        users.upsert(&User::new("u1", "Ada", "Lovelace")).unwrap();

        users.set_online("u1", true, None).await.unwrap();
        let user = users.get("u1").await.unwrap().unwrap();
        assert!(user.is_online);
        assert!(user.last_seen.is_none());

        let stamp = Utc::now();
        users.set_online("u1", false, Some(stamp)).await.unwrap();
        let user = users.get("u1").await.unwrap().unwrap();
        assert!(!user.is_online);
        assert_eq!(
            user.last_seen.map(|t| t.timestamp_millis()),
            Some(stamp.timestamp_millis())
        );

        // A later online mark must not erase last_seen.
        users.set_online("u1", true, None).await.unwrap();
        let user = users.get("u1").await.unwrap().unwrap();
        assert!(user.last_seen.is_some());
    }

    #[tokio::test]
    async fn test_unknown_user_update_is_a_noop() {
        let db = Database::open_in_memory().unwrap();
        let users = db.user_store();
        users.set_online("ghost", true, None).await.unwrap();
        assert!(users.get("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_edge_authorization_queries() {
        let db = Database::open_in_memory().unwrap();
        let edges = db.edge_store();

        edges.set_edge("a", "b", ConnectionStatus::Accepted).unwrap();
        edges.set_edge("a", "c", ConnectionStatus::Interested).unwrap();

        assert!(edges.accepted_between("a", "b").await.unwrap());
        assert!(edges.accepted_between("b", "a").await.unwrap());
        assert!(!edges.accepted_between("a", "c").await.unwrap());

        // Review flips the edge in place; authorization follows.
        edges.set_edge("a", "c", ConnectionStatus::Accepted).unwrap();
        assert!(edges.accepted_between("c", "a").await.unwrap());
    }
}
