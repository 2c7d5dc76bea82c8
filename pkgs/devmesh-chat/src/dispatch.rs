//! Event dispatch core.
//!
//! One [`ChatServer`] per process coordinates the hub, the presence
//! registry, the message store and the authorization gate. A connection
//! moves through `Anonymous -> Identified -> (N x room joined)`: attaching
//! yields an anonymous connection, `userOnline` binds an identity, and
//! `joinChat` adds room memberships.
//!
//! The transport must call [`ChatServer::handle`] strictly sequentially for
//! a given connection (one read loop per socket gives this for free);
//! handlers for different connections run concurrently.
//!
//! Every failure path degrades to "no visible effect": malformed events are
//! ignored, denied sends answer the sender only, store failures are logged
//! and the connection stays alive.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::backplane::{Backplane, Frame, Scope};
use crate::events::{ClientEvent, ServerEvent};
use crate::gate::ConnectionGate;
use crate::presence::{PresenceChange, PresenceRegistry, PresenceStore};
use crate::room::room_id;
use crate::rooms::{ConnId, Hub};
use crate::store::ChatStore;
use crate::users::{EdgeStore, UserStore};

pub struct ChatServer {
    /// Origin tag for backplane frames, unique per process instance.
    instance: Uuid,
    hub: Hub,
    presence: PresenceRegistry,
    store: Arc<dyn ChatStore>,
    gate: ConnectionGate,
    backplane: Option<Arc<dyn Backplane>>,
    /// Identity bound to each connection by `userOnline`.
    identities: Mutex<HashMap<ConnId, String>>,
}

impl ChatServer {
    pub fn new(
        store: Arc<dyn ChatStore>,
        users: Arc<dyn UserStore>,
        edges: Arc<dyn EdgeStore>,
        presence: Arc<dyn PresenceStore>,
    ) -> Self {
        Self {
            instance: Uuid::new_v4(),
            hub: Hub::new(),
            presence: PresenceRegistry::new(presence, users),
            store,
            gate: ConnectionGate::new(edges),
            backplane: None,
            identities: Mutex::new(HashMap::new()),
        }
    }

    /// Attach a broadcast backplane for multi-process deployments.
    pub fn with_backplane(mut self, backplane: Arc<dyn Backplane>) -> Self {
        self.backplane = Some(backplane);
        self
    }

    /// Register a new (anonymous) connection. The receiver carries every
    /// outbound event for that connection, in emission order.
    pub fn connect(&self) -> (ConnId, mpsc::UnboundedReceiver<ServerEvent>) {
        self.hub.attach()
    }

    /// Transport-level disconnect: leave all rooms, drop the presence
    /// handle, and broadcast the offline transition if it was the user's
    /// last handle.
    pub async fn disconnect(&self, conn_id: ConnId) {
        let identity = self.identities.lock().remove(&conn_id);
        self.hub.detach(conn_id);

        // A connection that never identified holds no presence handle.
        let Some(user_id) = identity else {
            return;
        };
        debug!("Connection {conn_id} for {user_id} closed");
        if let Some(change) = self.presence.mark_offline(conn_id).await {
            self.broadcast_global(user_status(change)).await;
        }
    }

    /// Process one inbound event for a connection.
    pub async fn handle(&self, conn_id: ConnId, event: ClientEvent) {
        match event {
            ClientEvent::UserOnline { user_id } => self.on_user_online(conn_id, user_id).await,
            ClientEvent::JoinChat { user_id, target_id } => self.on_join_chat(conn_id, user_id, target_id),
            ClientEvent::SendMessage {
                first_name,
                last_name,
                user_id,
                target_id,
                text,
            } => {
                self.on_send_message(conn_id, first_name, last_name, user_id, target_id, text)
                    .await
            }
            ClientEvent::MessageSeen {
                chat_id,
                message_id,
                user_id,
                target_id,
            } => self.on_message_seen(chat_id, message_id, user_id, target_id).await,
        }
    }

    async fn on_user_online(&self, conn_id: ConnId, user_id: String) {
        if user_id.is_empty() {
            return;
        }
        self.identities.lock().insert(conn_id, user_id.clone());
        if let Some(change) = self.presence.mark_online(&user_id, conn_id).await {
            self.broadcast_global(user_status(change)).await;
        }
    }

    fn on_join_chat(&self, conn_id: ConnId, user_id: String, target_id: String) {
        if user_id.is_empty() || target_id.is_empty() {
            return;
        }
        let room = room_id(&user_id, &target_id);
        self.hub.join(conn_id, &room);
        debug!("Connection {conn_id} joined {room}");
    }

    async fn on_send_message(
        &self,
        conn_id: ConnId,
        first_name: String,
        last_name: String,
        user_id: String,
        target_id: String,
        text: String,
    ) {
        if user_id.is_empty() || target_id.is_empty() || text.is_empty() {
            return;
        }

        match self.gate.is_connected(&user_id, &target_id).await {
            Ok(true) => {}
            Ok(false) => {
                warn!("Rejected message from {user_id} to {target_id}: not connected");
                self.hub.send_to_conn(
                    conn_id,
                    &ServerEvent::MessageRejected {
                        target_id,
                        reason: "Only connections can send messages".to_string(),
                    },
                );
                return;
            }
            Err(e) => {
                error!("Connection check failed for {user_id} -> {target_id}: {e}");
                return;
            }
        }

        let conversation = match self.store.find_or_create(&user_id, &target_id).await {
            Ok(conversation) => conversation,
            Err(e) => {
                error!("Failed to resolve conversation for {user_id} -> {target_id}: {e}");
                return;
            }
        };
        let message = match self.store.append_message(&conversation.id, &user_id, &text).await {
            Ok(message) => message,
            Err(e) => {
                error!("Failed to store message from {user_id}: {e}");
                return;
            }
        };

        // Broadcast only after the message is persisted; the payload never
        // carries the internal message id.
        let room = room_id(&user_id, &target_id);
        self.broadcast_room(
            &room,
            ServerEvent::MessageReceived {
                first_name,
                last_name,
                text: message.text,
                sent_at: message.sent_at,
                sender_id: user_id,
            },
        )
        .await;
    }

    async fn on_message_seen(&self, chat_id: String, message_id: String, user_id: String, target_id: String) {
        if chat_id.is_empty() || message_id.is_empty() || user_id.is_empty() || target_id.is_empty() {
            return;
        }

        let seen_at = match self.store.mark_seen(&chat_id, &message_id).await {
            Ok(Some(message)) => match message.seen_at {
                Some(seen_at) => seen_at,
                None => return,
            },
            Ok(None) => {
                debug!("Message {message_id} already seen");
                return;
            }
            Err(e) => {
                debug!("Dropping seen receipt for {message_id}: {e}");
                return;
            }
        };

        let room = room_id(&user_id, &target_id);
        self.broadcast_room(&room, ServerEvent::MessageSeen { message_id, seen_at })
            .await;
    }

    async fn broadcast_global(&self, event: ServerEvent) {
        self.hub.send_to_all(&event);
        self.publish(Scope::Global, event).await;
    }

    async fn broadcast_room(&self, room: &str, event: ServerEvent) {
        self.hub.send_to_room(room, &event);
        self.publish(Scope::Room(room.to_string()), event).await;
    }

    async fn publish(&self, scope: Scope, event: ServerEvent) {
        let Some(backplane) = &self.backplane else {
            return;
        };
        let frame = Frame {
            origin: self.instance,
            scope,
            event,
        };
        if let Err(e) = backplane.publish(&frame).await {
            error!("Backplane publish failed: {e}");
        }
    }

    /// Re-emit a frame received from the backplane to local connections.
    /// Frames published by this instance are skipped.
    pub fn apply_remote(&self, frame: Frame) {
        if frame.origin == self.instance {
            return;
        }
        match frame.scope {
            Scope::Global => self.hub.send_to_all(&frame.event),
            Scope::Room(room) => self.hub.send_to_room(&room, &frame.event),
        }
    }

    /// True while the user holds at least one live handle anywhere the
    /// presence store can see.
    pub async fn is_online(&self, user_id: &str) -> bool {
        self.presence.is_online(user_id).await
    }
}

fn user_status(change: PresenceChange) -> ServerEvent {
    ServerEvent::UserStatus {
        user_id: change.user_id,
        is_online: change.is_online,
        last_seen: change.last_seen,
    }
}
