use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use devmesh_backplane::{RedisBackplane, RedisPresenceStore, DEFAULT_CHANNEL};
use devmesh_chat::{
    ChatServer, ChatStore, EdgeStore, MemoryChatStore, MemoryEdgeStore, MemoryPresenceStore,
    MemoryUserStore, UserStore,
};
use devmesh_store::Database;

use super::config::Config;

pub struct AppState {
    pub config: Config,
    pub server: Arc<ChatServer>,
}

impl AppState {
    /// Wire stores, presence and backplane according to the config.
    pub async fn new(config: Config) -> Result<Arc<Self>> {
        let (store, users, edges): (Arc<dyn ChatStore>, Arc<dyn UserStore>, Arc<dyn EdgeStore>) =
            match &config.db_path {
                Some(path) => {
                    let db = Database::open(path).context("Failed to open database")?;
                    (
                        Arc::new(db.chat_store()),
                        Arc::new(db.user_store()),
                        Arc::new(db.edge_store()),
                    )
                }
                None => {
                    warn!("No DEVMESH_DB configured, using in-memory stores");
                    (
                        Arc::new(MemoryChatStore::new()),
                        Arc::new(MemoryUserStore::new()),
                        Arc::new(MemoryEdgeStore::new()),
                    )
                }
            };

        let server = match &config.redis_url {
            Some(url) => {
                let conn = devmesh_backplane::connect(url).await?;
                info!("Backplane enabled on {DEFAULT_CHANNEL}");
                let presence = Arc::new(RedisPresenceStore::new(conn.clone()));
                let backplane = Arc::new(RedisBackplane::new(conn, DEFAULT_CHANNEL));
                Arc::new(ChatServer::new(store, users, edges, presence).with_backplane(backplane))
            }
            None => Arc::new(ChatServer::new(
                store,
                users,
                edges,
                Arc::new(MemoryPresenceStore::new()),
            )),
        };

        if let Some(url) = &config.redis_url {
            devmesh_backplane::spawn_subscriber(url.clone(), DEFAULT_CHANNEL.to_string(), server.clone());
        }

        Ok(Arc::new(Self { config, server }))
    }
}
