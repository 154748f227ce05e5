use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::state::ServerState;

/// Upgrade to a live-viewer websocket
pub async fn handle_websocket(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<ServerState>) {
    let (mut sender, mut receiver) = socket.split();
    let (viewer_id, mut payloads) = state.viewers().register();
    info!("Viewer {} connected ({} total)", viewer_id, state.viewers().count());

    if let Some(session) = state.sessions.active() {
        match serde_json::to_string(&session.coordinator.initial_snapshot()) {
            Ok(json) => {
                if let Err(e) = sender.send(Message::Text(json.into())).await {
                    error!("Failed to send initial snapshot: {}", e);
                }
            }
            Err(e) => error!("Failed to serialize initial snapshot: {}", e),
        }
    }

    loop {
        tokio::select! {
            payload = payloads.recv() => {
                // None: the registry dropped this viewer after a failed send
                let Some(payload) = payload else {
                    debug!("Viewer {} dropped by registry", viewer_id);
                    break;
                };
                if let Err(e) = sender.send(Message::Text(payload.as_ref().into())).await {
                    debug!("Failed to send to viewer {}: {}", viewer_id, e);
                    break;
                }
            }

            msg = receiver.next() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                };

                match msg {
                    Message::Close(_) => {
                        info!("Viewer {} closed the connection", viewer_id);
                        break;
                    }
                    Message::Ping(data) => {
                        if let Err(e) = sender.send(Message::Pong(data)).await {
                            error!("Failed to send pong: {}", e);
                            break;
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    state.viewers().remove(&viewer_id);
    info!("Viewer {} disconnected", viewer_id);
}
