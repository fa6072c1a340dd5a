use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink, stream::SplitStream};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::tracker::TrackedSession;
use crate::session::SessionId;

/// How often to send WebSocket Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for a Pong response before considering the connection dead.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

// ── WebSocket message types ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WsMessage {
    SessionStarted {
        session: TrackedSession,
    },
    /// One successful fetch of a tracked session.
    SessionStatus {
        session_id: SessionId,
        status: String,
        attempt: u32,
        elapsed_ms: u64,
    },
    SessionCompleted {
        session: TrackedSession,
    },
    SessionFailed {
        session: TrackedSession,
    },
    SessionCancelled {
        session_id: SessionId,
    },
}

// ── WebSocket handler ────────────────────────────────────────────────

/// WebSocket handler that accepts a broadcast sender directly (for use with server router).
pub async fn ws_handler_with_sender(
    ws: WebSocketUpgrade,
    tx: broadcast::Sender<String>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket_with_sender(socket, tx))
}

async fn handle_socket_with_sender(socket: WebSocket, tx: broadcast::Sender<String>) {
    let (sender, receiver) = socket.split();
    let rx = tx.subscribe();
    debug!("WebSocket client connected");
    run_socket_loop(sender, receiver, rx).await;
    debug!("WebSocket client disconnected");
}

/// Core WebSocket loop with ping/pong keepalive.
///
/// Forwards broadcast events to the client and pings it every
/// [`PING_INTERVAL`]. A client that has not answered a ping within
/// [`PONG_TIMEOUT`] is dropped.
async fn run_socket_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut rx: broadcast::Receiver<String>,
) {
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    // First tick completes immediately.
    ping_interval.tick().await;

    let mut last_pong = Instant::now();
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                if awaiting_pong && last_pong.elapsed() > PONG_TIMEOUT {
                    debug!("WebSocket client missed pong, closing");
                    break;
                }
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
                awaiting_pong = true;
            }

            result = rx.recv() => {
                match result {
                    Ok(msg) => {
                        if sender.send(Message::Text(msg.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "WebSocket client lagged behind broadcast");
                        continue;
                    }
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = Instant::now();
                        awaiting_pong = false;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    // Text, Binary and Ping from the client are ignored
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    let _ = sender.send(Message::Close(None)).await;
}

// ── Broadcast helper ─────────────────────────────────────────────────

/// Serialize and broadcast a WsMessage to all connected WebSocket clients.
/// Returns silently even if no clients are connected.
pub fn broadcast_message(tx: &broadcast::Sender<String>, msg: &WsMessage) {
    match serde_json::to_string(msg) {
        Ok(json) => {
            let _ = tx.send(json);
        }
        Err(e) => {
            warn!(error = %e, "Failed to serialize WsMessage");
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
