use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::notify::Notification;
use crate::state::AppState;

// GET /ws: a `connect` frame first, then every published event as JSON text
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn send_notification(socket: &mut WebSocket, notification: &Notification) -> bool {
    let json = match serde_json::to_string(notification) {
        Ok(j) => j,
        Err(e) => {
            warn!("failed to serialize notification: {e}");
            return true;
        }
    };
    socket.send(Message::Text(json.into())).await.is_ok()
}

// Subscription is dropped on every return path, which unregisters it
async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let mut subscription = state.notifier.subscribe();

    let hello = Notification::new("connect", json!({ "subscriber_id": subscription.id() }));
    if !send_notification(&mut socket, &hello).await {
        return;
    }

    loop {
        tokio::select! {
            result = subscription.recv() => {
                match result {
                    Ok(notification) => {
                        if !send_notification(&mut socket, &notification).await {
                            debug!(subscriber = subscription.id(), "send failed, closing");
                            return;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(subscriber = subscription.id(), skipped, "subscriber lagged, skipping ahead");
                    }
                    Err(RecvError::Closed) => return,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => return,
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        debug!(subscriber = subscription.id(), "websocket error: {e}");
                        return;
                    }
                    _ => {}
                }
            }
        }
    }
}
