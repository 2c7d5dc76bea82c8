//! devmesh-chat - real-time chat core for the devmesh backend
//!
//! This crate implements the chat and presence subsystem: deterministic
//! room identity per participant pair, connection-gated message
//! authorization, a persisted append-only message store, read receipts,
//! online/offline presence tracking, and an event dispatch core that ties
//! them together behind a transport-agnostic connection hub.
//!
//! # Architecture
//!
//! - [`room`]: commutative room id derivation for a user pair
//! - [`events`]: the JSON wire protocol (client and server event enums)
//! - [`store`]: the [`ChatStore`] trait plus an in-memory implementation
//! - [`users`]: collaborator seams for user records and connection edges
//! - [`gate`]: accepted-connection check run before every send
//! - [`presence`]: live-handle registry with denormalized user persistence
//! - [`rooms`]: connection hub with room-scoped broadcast
//! - [`dispatch`]: the per-connection state machine coordinating the rest
//! - [`backplane`]: pub/sub seam for multi-process broadcast fan-out
//!
//! No network I/O happens here; a transport (see `devmesh-server`) attaches
//! connections to the [`ChatServer`] and drives it with decoded events.

pub mod backplane;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod gate;
pub mod models;
pub mod presence;
pub mod room;
pub mod rooms;
pub mod store;
pub mod users;

pub use backplane::{Backplane, Frame, Scope};
pub use dispatch::ChatServer;
pub use error::{ChatError, Result};
pub use events::{ClientEvent, ServerEvent};
pub use models::{ConnectionEdge, ConnectionStatus, Conversation, Message, User};
pub use presence::{MemoryPresenceStore, PresenceChange, PresenceRegistry, PresenceStore};
pub use room::room_id;
pub use rooms::{ConnId, Hub};
pub use store::{ChatStore, MemoryChatStore};
pub use users::{EdgeStore, MemoryEdgeStore, MemoryUserStore, UserStore};
