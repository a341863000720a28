//! WebSocket handling for relay clients.
//!
//! Each socket gets a connection id, a bounded outbound channel drained by a
//! send task, and a read loop that dispatches `ClientFrame`s.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use partyline_domain::ConnectionId;
use partyline_shared::{ClientFrame, ErrorCode, RelayFrame};

use super::connections::ConnectionManager;

#[cfg(test)]
mod test_support;
#[cfg(test)]
mod ws_integration_tests;

/// Buffer size for per-connection message channel.
const CONNECTION_CHANNEL_BUFFER: usize = 256;

/// Shared state for WebSocket handlers.
pub struct WsState {
    pub connections: Arc<ConnectionManager>,
}

impl WsState {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(ConnectionManager::new()),
        }
    }
}

impl Default for WsState {
    fn default() -> Self {
        Self::new()
    }
}

/// WebSocket upgrade handler - entry point for new connections.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<WsState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle an individual WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<WsState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let connection_id = ConnectionId::new();

    // Create a bounded channel for sending frames to this client
    let (tx, mut rx) = mpsc::channel::<RelayFrame>(CONNECTION_CHANNEL_BUFFER);

    let evicted = state.connections.register(connection_id, tx.clone()).await;

    tracing::info!(connection_id = %connection_id, "WebSocket connection established");

    // Spawn a task to forward frames from the channel to the WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            match serde_json::to_string(&frame) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::error!(error = %e, "Failed to serialize relay frame"),
            }
        }
    });

    // Handle incoming frames until the client leaves or the relay evicts it
    loop {
        let result = tokio::select! {
            next = ws_receiver.next() => match next {
                Some(result) => result,
                None => break,
            },
            _ = evicted.notified() => {
                tracing::warn!(connection_id = %connection_id, "Closing connection that fell behind");
                break;
            }
        };
        let text = match result {
            Ok(Message::Text(text)) => text.as_str().to_owned(),
            Ok(Message::Binary(bin)) => match String::from_utf8(bin.to_vec()) {
                Ok(text) => text,
                Err(_) => {
                    let _ = tx.try_send(RelayFrame::error(
                        ErrorCode::ParseError,
                        "Binary frames must be UTF-8 JSON",
                    ));
                    continue;
                }
            },
            Ok(Message::Close(_)) => {
                tracing::info!(connection_id = %connection_id, "WebSocket closed by client");
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                tracing::error!(connection_id = %connection_id, error = %e, "WebSocket error");
                break;
            }
        };

        match serde_json::from_str::<ClientFrame>(&text) {
            Ok(frame) => {
                if let Some(reply) = handle_frame(frame, &state, connection_id).await {
                    if tx.try_send(reply).is_err() {
                        tracing::warn!(
                            connection_id = %connection_id,
                            "Failed to send reply, channel full or closed"
                        );
                    }
                }
            }
            Err(e) => {
                tracing::warn!(connection_id = %connection_id, error = %e, "Failed to parse frame");
                let _ = tx.try_send(RelayFrame::error(
                    ErrorCode::ParseError,
                    format!("Invalid frame format: {}", e),
                ));
            }
        }
    }

    // Clean up
    state.connections.unregister(connection_id).await;
    send_task.abort();

    tracing::info!(connection_id = %connection_id, "WebSocket connection terminated");
}

/// Dispatch a parsed frame. Returns a reply for the sender, if any.
///
/// Successful joins reply through the connection manager so `RoomJoined`
/// is queued before any peer traffic.
async fn handle_frame(
    frame: ClientFrame,
    state: &WsState,
    connection_id: ConnectionId,
) -> Option<RelayFrame> {
    let result = match frame {
        ClientFrame::Heartbeat => return Some(RelayFrame::Pong),

        ClientFrame::CreateRoom { code } => state
            .connections
            .create_room(connection_id, code)
            .await
            .map(|_| ()),

        ClientFrame::JoinRoom { room, role } => {
            tracing::debug!(
                connection_id = %connection_id,
                room = %room,
                role = %role,
                "JoinRoom frame received"
            );
            state.connections.join_room(connection_id, room, role).await
        }

        ClientFrame::LeaveRoom => state
            .connections
            .leave_room(connection_id)
            .await
            .map(|_| ()),

        ClientFrame::Send { to, message } => state
            .connections
            .route(connection_id, to, message)
            .await
            .map(|_| ()),
    };

    match result {
        Ok(()) => None,
        Err(e) => {
            tracing::debug!(connection_id = %connection_id, error = %e, "Frame rejected");
            Some(e.to_frame())
        }
    }
}
