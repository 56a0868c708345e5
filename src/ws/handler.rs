//! Axum WebSocket upgrade handler.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::IntoResponse;

use super::connection::run_connection;
use crate::app_state::AppState;

/// `GET /ws` — Upgrade HTTP connection to an event stream.
///
/// The stream is registered with the subscriber registry once the upgrade
/// completes and unregistered when it ends.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let subscribers = Arc::clone(&state.subscribers);
    let buffer = state.subscriber_buffer;

    ws.on_upgrade(move |socket| async move {
        let (subscriber_id, events) = subscribers.subscribe(buffer);
        run_connection(socket, subscriber_id, events, subscribers).await;
    })
}
