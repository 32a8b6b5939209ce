//! services/api/src/web/ws_handler.rs
//!
//! The WebSocket entry point for live notifications: each connection is one
//! subscriber in the broadcast registry. The server only pushes; anything the
//! client sends besides close/ping is ignored.

use crate::web::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{error, info};

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(ws: WebSocketUpgrade, State(app_state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>) {
    let (subscriber_id, mut events) = app_state.broadcaster.subscribe().await;
    info!(subscriber_id = %subscriber_id, "WebSocket notification client connected");

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    // The broadcaster dropped us (slow consumer); close out.
                    break;
                };
                let json = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(e) => {
                        error!("Failed to serialize notification event: {}", e);
                        continue;
                    }
                };
                if sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                    // Pings are answered by axum; other frames are ignored.
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    app_state.broadcaster.unsubscribe(subscriber_id).await;
    info!(subscriber_id = %subscriber_id, "WebSocket notification client disconnected");
}
