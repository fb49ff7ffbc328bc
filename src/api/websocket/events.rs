//! Rotation events WebSocket
//!
//! Sends the current status on connect, then every rotation event as JSON.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use super::WS_BUFFER_SIZE;
use crate::api::server::AppState;
use crate::models::RotationEvent;

/// WebSocket handler for rotation events
pub async fn events_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_events_ws(socket, state))
}

async fn handle_events_ws(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<RotationEvent>(WS_BUFFER_SIZE);

    info!("Events WebSocket connected");

    // Subscribe before reading the snapshot so nothing falls in between
    let mut event_rx = state.rotation.subscribe();
    let snapshot = state.rotation.latest_status();

    let hello = json!({ "type": "status", "status": snapshot }).to_string();
    if sender.send(Message::Text(hello)).await.is_err() {
        debug!("Events WebSocket closed before snapshot was sent");
        return;
    }

    let mut forward_task = tokio::spawn(async move {
        loop {
            match event_rx.recv().await {
                Ok(event) => {
                    if tx.try_send(event).is_err() {
                        debug!("Events WebSocket buffer full, dropping event");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Events WebSocket lagged, missed {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event broadcast channel closed");
                    break;
                }
            }
        }
    });

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize rotation event: {}", e);
                }
            }
        }
    });

    let mut receive_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => {
                    debug!("Events WebSocket received close");
                    break;
                }
                Err(e) => {
                    debug!("Events WebSocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut forward_task => debug!("Forward task ended"),
        _ = &mut send_task => debug!("Send task ended"),
        _ = &mut receive_task => debug!("Receive task ended"),
    }

    forward_task.abort();
    send_task.abort();
    receive_task.abort();

    info!("Events WebSocket disconnected");
}
