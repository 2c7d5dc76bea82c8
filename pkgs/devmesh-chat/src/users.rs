//! Collaborator storage seams: user records and connection-request edges.
//!
//! Both entities are owned by the wider system; the chat core reads edges
//! to authorize messaging and writes only the denormalized presence fields
//! on the user record.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::error::Result;
use crate::models::{ConnectionEdge, ConnectionStatus, User};

/// Read/update access to user records.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<Option<User>>;

    /// Persist the denormalized presence fields. `last_seen` is only
    /// written when provided.
    async fn set_online(&self, user_id: &str, is_online: bool, last_seen: Option<DateTime<Utc>>) -> Result<()>;
}

/// Read access to connection-request edges.
#[async_trait]
pub trait EdgeStore: Send + Sync {
    /// True iff an edge with status `accepted` exists between the pair,
    /// in either direction.
    async fn accepted_between(&self, a: &str, b: &str) -> Result<bool>;
}

#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<String, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user: User) {
        self.users.write().insert(user.id.clone(), user);
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn get(&self, user_id: &str) -> Result<Option<User>> {
        Ok(self.users.read().get(user_id).cloned())
    }

    async fn set_online(&self, user_id: &str, is_online: bool, last_seen: Option<DateTime<Utc>>) -> Result<()> {
        if let Some(user) = self.users.write().get_mut(user_id) {
            user.is_online = is_online;
            if last_seen.is_some() {
                user.last_seen = last_seen;
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryEdgeStore {
    edges: RwLock<Vec<ConnectionEdge>>,
}

impl MemoryEdgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, from_user: impl Into<String>, to_user: impl Into<String>, status: ConnectionStatus) {
        self.edges.write().push(ConnectionEdge {
            from_user: from_user.into(),
            to_user: to_user.into(),
            status,
        });
    }
}

#[async_trait]
impl EdgeStore for MemoryEdgeStore {
    async fn accepted_between(&self, a: &str, b: &str) -> Result<bool> {
        Ok(self.edges.read().iter().any(|edge| {
            edge.status == ConnectionStatus::Accepted
                && ((edge.from_user == a && edge.to_user == b)
                    || (edge.from_user == b && edge.to_user == a))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_accepted_edge_matches_either_direction() {
        let edges = MemoryEdgeStore::new();
        edges.insert("alice", "bob", ConnectionStatus::Accepted);

        assert!(edges.accepted_between("alice", "bob").await.unwrap());
        assert!(edges.accepted_between("bob", "alice").await.unwrap());
        assert!(!edges.accepted_between("alice", "carol").await.unwrap());
    }

    #[tokio::test]
    async fn test_non_accepted_statuses_do_not_authorize() {
        let edges = MemoryEdgeStore::new();
        edges.insert("alice", "bob", ConnectionStatus::Interested);
        edges.insert("carol", "alice", ConnectionStatus::Rejected);
        edges.insert("dave", "alice", ConnectionStatus::Ignored);

        assert!(!edges.accepted_between("alice", "bob").await.unwrap());
        assert!(!edges.accepted_between("alice", "carol").await.unwrap());
        assert!(!edges.accepted_between("alice", "dave").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_online_updates_presence_fields() {
        let users = MemoryUserStore::new();
        users.insert(User::new("u1", "Ada", "Lovelace"));

        users.set_online("u1", true, None).await.unwrap();
        let user = users.get("u1").await.unwrap().unwrap();
        assert!(user.is_online);
        assert!(user.last_seen.is_none());

        let now = Utc::now();
        users.set_online("u1", false, Some(now)).await.unwrap();
        let user = users.get("u1").await.unwrap().unwrap();
        assert!(!user.is_online);
        assert_eq!(user.last_seen, Some(now));

        // Unknown user is a no-op, not an error.
        users.set_online("ghost", true, None).await.unwrap();
    }
}
