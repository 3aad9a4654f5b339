//! WebSocket Handler
//!
//! Handles WebSocket upgrade requests and manages the connection lifecycle.

use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::{IntoResponse, Response},
};
use futures_util::StreamExt;
use serde::Deserialize;
use std::sync::Arc;

use super::connection::Connection;
use super::hub::HubHandle;
use super::pump::PumpError;
use crate::api::{validate_room_key, AppState};
use crate::config::ConnectionConfig;

/// Query parameters accepted on the upgrade request
#[derive(Debug, Default, Deserialize)]
pub struct JoinParams {
    /// Display name shown in the room roster
    pub name: Option<String>,
}

/// WebSocket upgrade handler for `GET /ws/:room`
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Path(room): Path<String>,
    Query(params): Query<JoinParams>,
    State(state): State<Arc<AppState>>,
) -> Response {
    if let Err(e) = validate_room_key(&room) {
        return e.into_response();
    }

    let hub = state.hub.clone();
    let config = Arc::clone(&state.connection);
    ws.max_message_size(config.max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, hub, room, params.name, config))
}

/// Run both pumps for an established connection
async fn handle_socket(
    socket: WebSocket,
    hub: HubHandle,
    room: String,
    name: Option<String>,
    config: Arc<ConnectionConfig>,
) {
    let connection = Connection::new(room.clone(), name.as_deref(), config.send_queue_capacity);
    let (handle, inbound, outbound) = connection.into_parts(hub.clone(), &config);
    let connection_id = handle.id.clone();

    if let Err(e) = hub.register(handle).await {
        tracing::error!(room = %room, error = %e, "Failed to register WebSocket connection");
        return;
    }

    let (sink, stream) = socket.split();
    let mut send_task = tokio::spawn(outbound.run(sink));
    let mut recv_task = tokio::spawn(inbound.run(stream));

    tokio::select! {
        result = &mut recv_task => {
            // The inbound pump has already unregistered; give the writer
            // time to drain and send its close frame.
            log_exit(&connection_id, "inbound", result.ok());
            if tokio::time::timeout(config.write_wait(), &mut send_task).await.is_err() {
                send_task.abort();
            }
        }
        result = &mut send_task => {
            log_exit(&connection_id, "outbound", result.ok());
            recv_task.abort();
            if hub.unregister(connection_id.clone()).await.is_err() {
                tracing::debug!(connection_id = %connection_id, "Hub gone before unregister");
            }
        }
    }

    tracing::debug!(connection_id = %connection_id, room = %room, "WebSocket connection finished");
}

/// Log how a pump ended; clean closes and bad input log at debug
fn log_exit(connection_id: &str, pump: &str, result: Option<Result<(), PumpError>>) {
    match result {
        Some(Ok(())) => {
            tracing::debug!(connection_id = %connection_id, pump, "Connection closed");
        }
        Some(Err(e @ (PumpError::Evicted | PumpError::Decode(_)))) => {
            tracing::debug!(connection_id = %connection_id, pump, error = %e, "Connection closed");
        }
        Some(Err(e)) => {
            tracing::warn!(connection_id = %connection_id, pump, error = %e, "Connection terminated");
        }
        None => {
            tracing::error!(connection_id = %connection_id, pump, "Pump task panicked or was cancelled");
        }
    }
}
