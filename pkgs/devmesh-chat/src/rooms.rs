//! Connection hub and room membership.
//!
//! Each attached connection owns an unbounded outbound channel; the
//! transport drains it into the socket. Broadcast is deliver-or-drop: a
//! connection whose receiver is gone is pruned on the next send, nothing is
//! queued or retried.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::events::ServerEvent;

/// Globally unique handle for one live connection.
pub type ConnId = Uuid;

#[derive(Default)]
struct HubState {
    senders: HashMap<ConnId, mpsc::UnboundedSender<ServerEvent>>,
    rooms: HashMap<String, HashSet<ConnId>>,
    joined: HashMap<ConnId, HashSet<String>>,
}

#[derive(Default)]
pub struct Hub {
    state: Mutex<HubState>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection and hand back its outbound event stream.
    pub fn attach(&self) -> (ConnId, mpsc::UnboundedReceiver<ServerEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().senders.insert(conn_id, tx);
        debug!("Attached connection {conn_id}");
        (conn_id, rx)
    }

    /// Drop a connection and all of its room memberships.
    pub fn detach(&self, conn_id: ConnId) {
        let mut state = self.state.lock();
        state.senders.remove(&conn_id);
        if let Some(rooms) = state.joined.remove(&conn_id) {
            for room in rooms {
                if let Some(members) = state.rooms.get_mut(&room) {
                    members.remove(&conn_id);
                    if members.is_empty() {
                        state.rooms.remove(&room);
                    }
                }
            }
        }
        debug!("Detached connection {conn_id}");
    }

    /// Add a connection to a room. Re-entrant: joining twice is a no-op.
    pub fn join(&self, conn_id: ConnId, room: &str) {
        let mut state = self.state.lock();
        if !state.senders.contains_key(&conn_id) {
            return;
        }
        state.rooms.entry(room.to_string()).or_default().insert(conn_id);
        state.joined.entry(conn_id).or_default().insert(room.to_string());
    }

    /// Deliver an event to every member of a room.
    pub fn send_to_room(&self, room: &str, event: &ServerEvent) {
        let mut state = self.state.lock();
        let Some(members) = state.rooms.get(room) else {
            return;
        };
        let members: Vec<ConnId> = members.iter().copied().collect();
        for conn_id in members {
            Self::deliver(&mut state, conn_id, event);
        }
    }

    /// Deliver an event to every attached connection.
    pub fn send_to_all(&self, event: &ServerEvent) {
        let mut state = self.state.lock();
        let conns: Vec<ConnId> = state.senders.keys().copied().collect();
        for conn_id in conns {
            Self::deliver(&mut state, conn_id, event);
        }
    }

    /// Deliver an event to one connection.
    pub fn send_to_conn(&self, conn_id: ConnId, event: &ServerEvent) {
        let mut state = self.state.lock();
        Self::deliver(&mut state, conn_id, event);
    }

    fn deliver(state: &mut HubState, conn_id: ConnId, event: &ServerEvent) {
        if let Some(sender) = state.senders.get(&conn_id) {
            if sender.send(event.clone()).is_err() {
                // Receiver side is gone; the transport will detach shortly.
                state.senders.remove(&conn_id);
            }
        }
    }

    pub fn connection_count(&self) -> usize {
        self.state.lock().senders.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe() -> ServerEvent {
        ServerEvent::UserStatus {
            user_id: "u1".into(),
            is_online: true,
            last_seen: None,
        }
    }

    #[tokio::test]
    async fn test_room_scoped_delivery() {
        let hub = Hub::new();
        let (a, mut rx_a) = hub.attach();
        let (b, mut rx_b) = hub.attach();
        let (_c, mut rx_c) = hub.attach();

        hub.join(a, "room_1");
        hub.join(b, "room_1");

        hub.send_to_room("room_1", &probe());
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
        assert!(rx_c.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_rejoin_is_a_noop() {
        let hub = Hub::new();
        let (a, mut rx_a) = hub.attach();
        hub.join(a, "room_1");
        hub.join(a, "room_1");

        hub.send_to_room("room_1", &probe());
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_detach_leaves_all_rooms() {
        let hub = Hub::new();
        let (a, rx_a) = hub.attach();
        let (b, mut rx_b) = hub.attach();
        hub.join(a, "room_1");
        hub.join(b, "room_1");

        drop(rx_a);
        hub.detach(a);
        hub.send_to_room("room_1", &probe());
        assert!(rx_b.try_recv().is_ok());
        assert_eq!(hub.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_global_delivery_reaches_everyone() {
        let hub = Hub::new();
        let (_a, mut rx_a) = hub.attach();
        let (_b, mut rx_b) = hub.attach();

        hub.send_to_all(&probe());
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
    }
}
