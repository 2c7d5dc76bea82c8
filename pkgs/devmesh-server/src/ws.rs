//! WebSocket transport for the dispatch core.
//!
//! One task pair per socket: the read loop decodes JSON frames into
//! `ClientEvent`s and feeds them to the dispatcher in arrival order (which
//! gives the per-connection sequential guarantee), while a writer task
//! drains the connection's outbound channel back into the socket.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tracing::debug;

use devmesh_chat::ClientEvent;

use super::state::AppState;

pub async fn ws_handler(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| client_connection(socket, state))
}

async fn client_connection(socket: WebSocket, state: Arc<AppState>) {
    let (conn_id, mut outbound) = state.server.connect();
    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            let Ok(text) = serde_json::to_string(&event) else {
                continue;
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(frame)) = stream.next().await {
        match frame {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => state.server.handle(conn_id, event).await,
                Err(e) => debug!("Dropping malformed frame on {conn_id}: {e}"),
            },
            Message::Close(_) => break,
            // Pings are answered by axum; binary frames are not part of
            // the protocol.
            _ => {}
        }
    }

    state.server.disconnect(conn_id).await;
    writer.abort();
}
