//! Broadcast backplane seam for multi-process deployments.
//!
//! Every process publishes its local broadcasts as [`Frame`]s tagged with
//! its own instance id; a subscriber loop on each process feeds received
//! frames back into the dispatcher, which re-emits them to locally attached
//! connections and skips frames it originated itself.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::ServerEvent;

/// Delivery scope of a broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "room", rename_all = "camelCase")]
pub enum Scope {
    /// Every connection on every process.
    Global,
    /// Members of one room.
    Room(String),
}

/// One broadcast crossing process boundaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    /// Instance id of the publishing process.
    pub origin: Uuid,
    pub scope: Scope,
    pub event: ServerEvent,
}

/// Shared publish channel between server processes.
#[async_trait]
pub trait Backplane: Send + Sync {
    async fn publish(&self, frame: &Frame) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_round_trips_through_json() {
        let frame = Frame {
            origin: Uuid::new_v4(),
            scope: Scope::Room("room_abc".into()),
            event: ServerEvent::MessageSeen {
                message_id: "m1".into(),
                seen_at: chrono::Utc::now(),
            },
        };

        let json = serde_json::to_string(&frame).unwrap();
        let parsed: Frame = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.origin, frame.origin);
        assert_eq!(parsed.scope, frame.scope);
    }
}
