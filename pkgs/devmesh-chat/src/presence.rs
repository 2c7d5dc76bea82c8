//! Presence registry.
//!
//! Tracks which users currently hold at least one live connection. The
//! handle bookkeeping sits behind [`PresenceStore`] so single-process
//! deployments keep it in memory while clustered ones move it to a shared
//! store; handles are keyed by the globally unique connection id either way.
//!
//! The denormalized `is_online`/`last_seen` fields on the user record are
//! written as a side effect. Those writes are best-effort: a failed write is
//! logged but never suppresses the presence-changed event, which always
//! reflects the in-memory transition.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::users::UserStore;

/// Live-handle bookkeeping, keyed by connection id.
#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// Register a handle for a user. Returns true iff this was the user's
    /// first live handle (the user came online).
    async fn add_handle(&self, user_id: &str, conn_id: Uuid) -> Result<bool>;

    /// Remove a handle. Returns the owning user and whether it was the
    /// user's last handle; `None` for an unknown handle (disconnects can
    /// race or duplicate, so that is never an error).
    async fn remove_handle(&self, conn_id: Uuid) -> Result<Option<(String, bool)>>;

    async fn is_online(&self, user_id: &str) -> Result<bool>;

    async fn online_users(&self) -> Result<Vec<String>>;
}

#[derive(Default)]
struct MemoryPresence {
    owners: HashMap<Uuid, String>,
    handles: HashMap<String, HashSet<Uuid>>,
}

/// Process-local [`PresenceStore`].
#[derive(Default)]
pub struct MemoryPresenceStore {
    state: Mutex<MemoryPresence>,
}

impl MemoryPresenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PresenceStore for MemoryPresenceStore {
    async fn add_handle(&self, user_id: &str, conn_id: Uuid) -> Result<bool> {
        let mut state = self.state.lock();
        state.owners.insert(conn_id, user_id.to_string());
        let handles = state.handles.entry(user_id.to_string()).or_default();
        let was_empty = handles.is_empty();
        handles.insert(conn_id);
        Ok(was_empty)
    }

    async fn remove_handle(&self, conn_id: Uuid) -> Result<Option<(String, bool)>> {
        let mut state = self.state.lock();
        let Some(user_id) = state.owners.remove(&conn_id) else {
            return Ok(None);
        };
        let last = match state.handles.get_mut(&user_id) {
            Some(handles) => {
                handles.remove(&conn_id);
                handles.is_empty()
            }
            None => true,
        };
        if last {
            state.handles.remove(&user_id);
        }
        Ok(Some((user_id, last)))
    }

    async fn is_online(&self, user_id: &str) -> Result<bool> {
        Ok(self.state.lock().handles.contains_key(user_id))
    }

    async fn online_users(&self) -> Result<Vec<String>> {
        Ok(self.state.lock().handles.keys().cloned().collect())
    }
}

/// An online/offline transition to broadcast as a `userStatus` event.
#[derive(Debug, Clone)]
pub struct PresenceChange {
    pub user_id: String,
    pub is_online: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Couples handle bookkeeping with user-record persistence.
pub struct PresenceRegistry {
    store: Arc<dyn PresenceStore>,
    users: Arc<dyn UserStore>,
}

impl PresenceRegistry {
    pub fn new(store: Arc<dyn PresenceStore>, users: Arc<dyn UserStore>) -> Self {
        Self { store, users }
    }

    /// Register a handle. Persists `is_online = true` on every call (safe
    /// to repeat); returns a change to broadcast only on the first handle.
    pub async fn mark_online(&self, user_id: &str, conn_id: Uuid) -> Option<PresenceChange> {
        let came_online = match self.store.add_handle(user_id, conn_id).await {
            Ok(came_online) => came_online,
            Err(e) => {
                warn!("Presence store rejected handle for {user_id}: {e}");
                return None;
            }
        };

        if let Err(e) = self.users.set_online(user_id, true, None).await {
            warn!("Failed to persist online flag for {user_id}: {e}");
        }

        if came_online {
            debug!("User {user_id} came online");
            Some(PresenceChange {
                user_id: user_id.to_string(),
                is_online: true,
                last_seen: None,
            })
        } else {
            None
        }
    }

    /// Drop a handle on disconnect. Unknown handles are a silent no-op.
    /// On the last handle, stamps `last_seen` and returns the offline
    /// change to broadcast.
    pub async fn mark_offline(&self, conn_id: Uuid) -> Option<PresenceChange> {
        let removed = match self.store.remove_handle(conn_id).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!("Presence store failed to drop handle {conn_id}: {e}");
                return None;
            }
        };
        let (user_id, last) = removed?;
        if !last {
            return None;
        }

        let last_seen = Utc::now();
        if let Err(e) = self.users.set_online(&user_id, false, Some(last_seen)).await {
            warn!("Failed to persist offline state for {user_id}: {e}");
        }

        debug!("User {user_id} went offline");
        Some(PresenceChange {
            user_id,
            is_online: false,
            last_seen: Some(last_seen),
        })
    }

    pub async fn is_online(&self, user_id: &str) -> bool {
        self.store.is_online(user_id).await.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;
    use crate::users::MemoryUserStore;

    fn registry() -> (PresenceRegistry, Arc<MemoryUserStore>) {
        let users = Arc::new(MemoryUserStore::new());
        users.insert(User::new("u1", "Ada", "Lovelace"));
        let registry = PresenceRegistry::new(Arc::new(MemoryPresenceStore::new()), users.clone());
        (registry, users)
    }

    #[tokio::test]
    async fn test_single_handle_lifecycle() {
        let (registry, users) = registry();
        let conn = Uuid::new_v4();

        let change = registry.mark_online("u1", conn).await.expect("came online");
        assert!(change.is_online);
        assert!(registry.is_online("u1").await);
        assert!(users.get("u1").await.unwrap().unwrap().is_online);

        let change = registry.mark_offline(conn).await.expect("went offline");
        assert!(!change.is_online);
        assert!(change.last_seen.is_some());
        assert!(!registry.is_online("u1").await);

        let user = users.get("u1").await.unwrap().unwrap();
        assert!(!user.is_online);
        assert_eq!(user.last_seen, change.last_seen);
    }

    #[tokio::test]
    async fn test_multiple_handles_emit_one_transition_each_way() {
        let (registry, _) = registry();
        let conns = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];

        assert!(registry.mark_online("u1", conns[0]).await.is_some());
        assert!(registry.mark_online("u1", conns[1]).await.is_none());
        assert!(registry.mark_online("u1", conns[2]).await.is_none());

        assert!(registry.mark_offline(conns[0]).await.is_none());
        assert!(registry.mark_offline(conns[1]).await.is_none());
        let change = registry.mark_offline(conns[2]).await.expect("last handle");
        assert!(!change.is_online);
    }

    #[tokio::test]
    async fn test_unknown_handle_disconnect_is_noop() {
        let (registry, _) = registry();
        assert!(registry.mark_offline(Uuid::new_v4()).await.is_none());

        // A duplicated disconnect is equally silent.
        let conn = Uuid::new_v4();
        registry.mark_online("u1", conn).await;
        registry.mark_offline(conn).await;
        assert!(registry.mark_offline(conn).await.is_none());
    }
}
