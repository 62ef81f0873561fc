//! WebSocket handler for live state-change updates.
//!
//! Each connection registers a channel on the notification bus and streams
//! every broadcast to the client. The only inbound message the channel
//! supports is a liveness ping; everything else is ignored for state
//! purposes.
//!
//! # Architecture
//!
//! ```text
//! Client          WebSocket Handler          NotificationBus
//!   │                    │                        │
//!   ├─ Connect ─────────>│                        │
//!   │                    ├─ subscribe() ─────────>│
//!   │<─ connected ack ───┤                        │
//!   │                    │<── broadcast ──────────┤
//!   │<─ Receive Event ───┤                        │
//!   ├─ Send Ping ───────>│                        │
//!   │<─ Pong ────────────┤                        │
//! ```
//!
//! # Message Protocol
//!
//! **Client → Server (liveness ping):**
//! ```json
//! {"type": "ping"}
//! ```
//!
//! **Server → Client:** the [`Notification`] wire format, e.g.
//! ```json
//! {"type": "attendance_confirmed", "event_id": "...", "lock_state": "locked", ...}
//! ```

use crate::state::AppState;
use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, stream::StreamExt};
use muster_core::Notification;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Inbound client message. Only the liveness ping is meaningful.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    /// Keep-alive probe; answered with a pong notification
    Ping,
}

/// WebSocket upgrade handler.
#[allow(clippy::unused_async)] // Axum handler signature requires async
pub async fn handle(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    info!("WebSocket connection requested");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle WebSocket connection lifecycle.
///
/// Spawns two concurrent tasks:
/// 1. **Sender**: stream bus broadcasts (and pong replies) to the client
/// 2. **Receiver**: consume inbound messages, honoring only the ping
async fn handle_socket(socket: WebSocket, state: AppState) {
    let handle = state.bus.subscribe();
    let subscriber_id = handle.id;
    let mut notifications = handle.receiver;
    info!(%subscriber_id, "WebSocket connection established");

    let (mut sender, mut receiver) = socket.split();

    // Pong replies cross from the receive task to the send task so the
    // socket sink stays single-owner.
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();

    let mut send_task = tokio::spawn(async move {
        loop {
            let notification = tokio::select! {
                maybe = notifications.recv() => match maybe {
                    Some(notification) => notification,
                    // Bus pruned this subscriber; nothing left to stream.
                    None => break,
                },
                maybe_ping = pong_rx.recv() => match maybe_ping {
                    Some(()) => Notification::Pong,
                    None => break,
                },
            };

            let message = match serde_json::to_string(&notification) {
                Ok(json) => Message::Text(json),
                Err(e) => {
                    warn!(error = %e, "Failed to serialize notification");
                    continue;
                }
            };

            if sender.send(message).await.is_err() {
                // Client disconnected.
                break;
            }
        }

        debug!("WebSocket send task terminated");
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Ping) => {
                        debug!("Received ping from client");
                        if pong_tx.send(()).is_err() {
                            break;
                        }
                    }
                    Err(_) => {
                        // State-irrelevant chatter is ignored.
                        debug!("Ignoring non-ping client message");
                    }
                },
                Message::Ping(_) | Message::Pong(_) => {
                    // Protocol-level keep-alive; Axum answers pings itself.
                }
                Message::Binary(_) => {
                    warn!("Received unexpected binary message");
                }
                Message::Close(_) => {
                    info!("Client requested close");
                    break;
                }
            }
        }

        debug!("WebSocket receive task terminated");
    });

    // Wait for either task to complete (connection closed).
    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
        },
        _ = (&mut recv_task) => {
            send_task.abort();
        },
    }

    state.bus.unsubscribe(subscriber_id);
    info!(%subscriber_id, "WebSocket connection closed");
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    #[test]
    fn test_client_ping_parses() {
        let parsed: ClientMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(parsed, ClientMessage::Ping));
    }

    #[test]
    fn test_unknown_client_message_is_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"command"}"#).is_err());
    }

    #[test]
    fn test_notification_serializes_to_tagged_json() {
        let json = serde_json::to_string(&Notification::Pong).unwrap();
        assert_eq!(json, r#"{"type":"pong"}"#);
    }
}
