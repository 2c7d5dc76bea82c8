//! devmesh-backplane - Redis-backed scale-out for the chat dispatch core
//!
//! When the deployment spans several server processes, two things must
//! leave process-local memory:
//!
//! - **Broadcasts**: every process publishes its room/global broadcasts as
//!   JSON [`Frame`]s on one pub/sub channel and re-emits frames from other
//!   processes to its own connections ([`RedisBackplane`] +
//!   [`spawn_subscriber`]).
//! - **Presence**: the handle-to-user mapping moves into Redis keyed by the
//!   globally unique connection id, so `is_online` and the online set are
//!   consistent cluster-wide ([`RedisPresenceStore`]).

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{AsyncCommands, Client};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use devmesh_chat::{Backplane, ChatServer, Frame, PresenceStore};

/// Channel every process in a deployment shares.
pub const DEFAULT_CHANNEL: &str = "devmesh:broadcast";

const KEY_PREFIX: &str = "devmesh:presence";

/// Open a managed connection with short retries, reusable by both the
/// backplane and the presence store.
pub async fn connect(redis_url: &str) -> Result<ConnectionManager> {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(2)
        .set_connection_timeout(Duration::from_millis(500));

    let client = Client::open(redis_url).context("Invalid Redis URL")?;
    let manager = client
        .get_connection_manager_with_config(config)
        .await
        .context("Failed to connect to Redis")?;
    Ok(manager)
}

/// Publishes local broadcasts to the shared channel.
pub struct RedisBackplane {
    conn: ConnectionManager,
    channel: String,
}

impl RedisBackplane {
    pub fn new(conn: ConnectionManager, channel: impl Into<String>) -> Self {
        Self {
            conn,
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl Backplane for RedisBackplane {
    async fn publish(&self, frame: &Frame) -> Result<()> {
        let payload = serde_json::to_string(frame).context("Failed to encode frame")?;
        let mut conn = self.conn.clone();
        conn.publish::<_, _, ()>(&self.channel, payload)
            .await
            .context("Failed to publish frame")?;
        Ok(())
    }
}

/// Subscribe to the shared channel and feed foreign frames back into the
/// dispatcher. Runs until aborted; connection loss is retried with a short
/// backoff so a Redis hiccup never takes the process down.
pub fn spawn_subscriber(redis_url: String, channel: String, server: Arc<ChatServer>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(e) = subscribe_loop(&redis_url, &channel, &server).await {
                error!("Backplane subscriber lost its connection: {e}");
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    })
}

async fn subscribe_loop(redis_url: &str, channel: &str, server: &ChatServer) -> Result<()> {
    let client = Client::open(redis_url).context("Invalid Redis URL")?;
    let mut pubsub = client
        .get_async_pubsub()
        .await
        .context("Failed to open pub/sub connection")?;
    pubsub.subscribe(channel).await.context("Failed to subscribe")?;
    info!("Subscribed to backplane channel {channel}");

    let mut stream = pubsub.on_message();
    while let Some(msg) = stream.next().await {
        let payload: String = match msg.get_payload() {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Skipping unreadable backplane message: {e}");
                continue;
            }
        };
        match serde_json::from_str::<Frame>(&payload) {
            Ok(frame) => {
                debug!("Applying remote frame from {}", frame.origin);
                server.apply_remote(frame);
            }
            Err(e) => warn!("Skipping malformed backplane frame: {e}"),
        }
    }
    Ok(())
}

/// Cluster-shared presence store.
///
/// Keys: `devmesh:presence:owner:{conn}` maps a connection id to its user,
/// `devmesh:presence:handles:{user}` holds the user's live connection ids,
/// and `devmesh:presence:online` is the set of online users. The
/// first/last-handle checks are not transactional across processes; a
/// connect/disconnect race can momentarily misreport the transition, which
/// the dispatch core already tolerates.
pub struct RedisPresenceStore {
    conn: ConnectionManager,
}

impl RedisPresenceStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    fn owner_key(conn_id: Uuid) -> String {
        format!("{KEY_PREFIX}:owner:{conn_id}")
    }

    fn handles_key(user_id: &str) -> String {
        format!("{KEY_PREFIX}:handles:{user_id}")
    }

    fn online_key() -> String {
        format!("{KEY_PREFIX}:online")
    }
}

#[async_trait]
impl PresenceStore for RedisPresenceStore {
    async fn add_handle(&self, user_id: &str, conn_id: Uuid) -> devmesh_chat::Result<bool> {
        let mut conn = self.conn.clone();
        let handle = conn_id.to_string();

        conn.set::<_, _, ()>(Self::owner_key(conn_id), user_id)
            .await
            .context("Failed to record handle owner")?;
        conn.sadd::<_, _, ()>(Self::handles_key(user_id), &handle)
            .await
            .context("Failed to add handle")?;
        let count: i64 = conn
            .scard(Self::handles_key(user_id))
            .await
            .context("Failed to count handles")?;

        let came_online = count == 1;
        if came_online {
            conn.sadd::<_, _, ()>(Self::online_key(), user_id)
                .await
                .context("Failed to mark user online")?;
        }
        Ok(came_online)
    }

    async fn remove_handle(&self, conn_id: Uuid) -> devmesh_chat::Result<Option<(String, bool)>> {
        let mut conn = self.conn.clone();

        let user_id: Option<String> = conn
            .get(Self::owner_key(conn_id))
            .await
            .context("Failed to look up handle owner")?;
        let Some(user_id) = user_id else {
            return Ok(None);
        };

        conn.del::<_, ()>(Self::owner_key(conn_id))
            .await
            .context("Failed to drop handle owner")?;
        conn.srem::<_, _, ()>(Self::handles_key(&user_id), conn_id.to_string())
            .await
            .context("Failed to drop handle")?;
        let remaining: i64 = conn
            .scard(Self::handles_key(&user_id))
            .await
            .context("Failed to count handles")?;

        let last = remaining == 0;
        if last {
            conn.srem::<_, _, ()>(Self::online_key(), &user_id)
                .await
                .context("Failed to mark user offline")?;
        }
        Ok(Some((user_id, last)))
    }

    async fn is_online(&self, user_id: &str) -> devmesh_chat::Result<bool> {
        let mut conn = self.conn.clone();
        let online: bool = conn
            .sismember(Self::online_key(), user_id)
            .await
            .context("Failed to check online set")?;
        Ok(online)
    }

    async fn online_users(&self) -> devmesh_chat::Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let users: Vec<String> = conn
            .smembers(Self::online_key())
            .await
            .context("Failed to read online set")?;
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presence_keys_are_namespaced() {
        let conn_id = Uuid::new_v4();
        assert_eq!(
            RedisPresenceStore::owner_key(conn_id),
            format!("devmesh:presence:owner:{conn_id}")
        );
        assert_eq!(
            RedisPresenceStore::handles_key("u1"),
            "devmesh:presence:handles:u1"
        );
        assert_eq!(RedisPresenceStore::online_key(), "devmesh:presence:online");
    }
}
