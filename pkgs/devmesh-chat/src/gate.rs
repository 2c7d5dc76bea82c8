//! Authorization gate for message sends.
//!
//! Two users may exchange messages only while an accepted connection edge
//! exists between them. The gate is a pure read over the edge store and is
//! consulted before any message is persisted.

use std::sync::Arc;

use crate::error::Result;
use crate::users::EdgeStore;

pub struct ConnectionGate {
    edges: Arc<dyn EdgeStore>,
}

impl ConnectionGate {
    pub fn new(edges: Arc<dyn EdgeStore>) -> Self {
        Self { edges }
    }

    /// True iff the pair holds an accepted connection in either direction.
    pub async fn is_connected(&self, a: &str, b: &str) -> Result<bool> {
        self.edges.accepted_between(a, b).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConnectionStatus;
    use crate::users::MemoryEdgeStore;

    #[tokio::test]
    async fn test_gate_follows_edge_status() {
        let edges = Arc::new(MemoryEdgeStore::new());
        edges.insert("alice", "bob", ConnectionStatus::Accepted);
        edges.insert("alice", "carol", ConnectionStatus::Interested);

        let gate = ConnectionGate::new(edges);
        assert!(gate.is_connected("bob", "alice").await.unwrap());
        assert!(!gate.is_connected("alice", "carol").await.unwrap());
        assert!(!gate.is_connected("alice", "nobody").await.unwrap());
    }
}
