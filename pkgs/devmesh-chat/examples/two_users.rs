//! Two users chatting through an in-process dispatch core.
//!
//! Run with: cargo run --example two_users -p devmesh-chat

use std::sync::Arc;

use devmesh_chat::{
    ChatServer, ClientEvent, ConnectionStatus, MemoryChatStore, MemoryEdgeStore,
    MemoryPresenceStore, MemoryUserStore, User,
};

#[tokio::main]
async fn main() {
    let users = Arc::new(MemoryUserStore::new());
    users.insert(User::new("ada", "Ada", "Lovelace"));
    users.insert(User::new("bob", "Bob", "Tables"));

    let edges = Arc::new(MemoryEdgeStore::new());
    edges.insert("ada", "bob", ConnectionStatus::Accepted);

    let server = ChatServer::new(
        Arc::new(MemoryChatStore::new()),
        users,
        edges,
        Arc::new(MemoryPresenceStore::new()),
    );

    let (ada, mut ada_rx) = server.connect();
    let (bob, mut bob_rx) = server.connect();

    server.handle(ada, ClientEvent::UserOnline { user_id: "ada".into() }).await;
    server.handle(bob, ClientEvent::UserOnline { user_id: "bob".into() }).await;
    for (conn, user, target) in [(ada, "ada", "bob"), (bob, "bob", "ada")] {
        server
            .handle(
                conn,
                ClientEvent::JoinChat {
                    user_id: user.into(),
                    target_id: target.into(),
                },
            )
            .await;
    }

    server
        .handle(
            ada,
            ClientEvent::SendMessage {
                first_name: "Ada".into(),
                last_name: "Lovelace".into(),
                user_id: "ada".into(),
                target_id: "bob".into(),
                text: "hi bob".into(),
            },
        )
        .await;

    while let Ok(event) = ada_rx.try_recv() {
        println!("ada  <- {}", serde_json::to_string(&event).unwrap());
    }
    while let Ok(event) = bob_rx.try_recv() {
        println!("bob  <- {}", serde_json::to_string(&event).unwrap());
    }

    server.disconnect(ada).await;
    server.disconnect(bob).await;
}
