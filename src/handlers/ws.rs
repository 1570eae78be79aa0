//! WebSocket feed of the harness event log: each appended entry is pushed as JSON.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::handlers::http::AppState;
use crate::models::event::EventLogEntry;

/// GET /live/events/ws
pub async fn events_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: AppState, socket: WebSocket) {
    let watcher_id = Uuid::new_v4();
    // Subscribe before anything else so no entry appended after the upgrade is missed.
    let mut feed = state.harness().watch_events();
    info!(watcher_id = %watcher_id, "event watcher connected");

    let (mut sender, mut receiver) = socket.split();

    let send_task = tokio::spawn(async move {
        loop {
            let entry = match feed.recv().await {
                Ok(entry) => entry,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(watcher_id = %watcher_id, skipped, "event watcher lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            let Some(text) = encode(&entry) else {
                continue;
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Close(_) => break,
            other => debug!(watcher_id = %watcher_id, ?other, "ignoring inbound ws message"),
        }
    }

    send_task.abort();
    info!(watcher_id = %watcher_id, "event watcher disconnected");
}

fn encode(entry: &EventLogEntry) -> Option<String> {
    match serde_json::to_string(entry) {
        Ok(text) => Some(text),
        Err(e) => {
            warn!(entry_id = entry.id, error = %e, "failed to encode event");
            None
        }
    }
}
