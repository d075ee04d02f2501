//! Streaming channel for live session viewers.
//!
//! Each socket is scoped to one (session, user) pair. On open the viewer is
//! joined (registered, then caught up); inbound text frames are parsed as
//! messages and appended; on close the viewer is disconnected.

use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message as WsMessage, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::AppState;
use crate::error::SyncError;
use crate::registry::{Connection, Frame};
use crate::session::Message;
use crate::synchronizer::SessionSynchronizer;

/// Query parameters for the streaming endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamQuery {
    #[serde(alias = "session_id")]
    pub session_id: String,
    #[serde(alias = "user_id")]
    pub user_id: String,
}

/// GET /ws/session - Open a streaming connection to one session.
pub async fn ws_session(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    info!(
        name: "ws.upgrade",
        session_id = %query.session_id,
        user_id = %query.user_id,
        "Streaming connection requested"
    );

    let ping_interval = Duration::from_secs(state.config.server.ping_interval_secs.max(1));
    ws.on_upgrade(move |socket| {
        handle_socket(
            socket,
            state.synchronizer,
            query.session_id,
            query.user_id,
            ping_interval,
        )
    })
}

async fn handle_socket(
    socket: WebSocket,
    sync: SessionSynchronizer,
    session_id: String,
    user_id: String,
    ping_interval: Duration,
) {
    let (mut sender, mut receiver) = socket.split();
    let (connection, mut outbound) = Connection::channel();

    if !sync.join(&connection, &session_id, &user_id).await {
        let frame = Frame::Error {
            error: format!("Session not available: {session_id}"),
        };
        if let Ok(json) = serde_json::to_string(&frame) {
            let _ = sender.send(WsMessage::Text(json.into())).await;
        }
        let _ = sender.send(WsMessage::Close(None)).await;
        info!(
            name: "ws.closed",
            session_id = %session_id,
            user_id = %user_id,
            reason = "catch_up_failed",
            "Streaming connection closed"
        );
        return;
    }

    // Writer: drains the outbound queue (catch-up batch first) and keeps the socket alive.
    let send_task = tokio::spawn(async move {
        let mut ping = tokio::time::interval(ping_interval);
        ping.tick().await;

        loop {
            tokio::select! {
                frame = outbound.recv() => {
                    let Some(frame) = frame else { break };
                    let json = match serde_json::to_string(&frame) {
                        Ok(j) => j,
                        Err(e) => {
                            warn!("Failed to serialize frame: {}", e);
                            continue;
                        }
                    };
                    if sender.send(WsMessage::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                _ = ping.tick() => {
                    if sender.send(WsMessage::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(WsMessage::Text(text)) => {
                handle_inbound(&sync, &connection, &session_id, &user_id, text.as_str()).await;
            }
            Ok(WsMessage::Binary(_)) => {
                reject(&connection, &SyncError::Validation("binary frames are not supported".into()));
            }
            Ok(WsMessage::Close(_)) => {
                debug!(session_id = %session_id, user_id = %user_id, "Peer closed connection");
                break;
            }
            Ok(WsMessage::Ping(_) | WsMessage::Pong(_)) => {}
            Err(e) => {
                warn!(
                    name: "ws.error",
                    session_id = %session_id,
                    user_id = %user_id,
                    error = %e,
                    "Streaming connection error"
                );
                break;
            }
        }
    }

    sync.registry().disconnect(&connection);
    send_task.abort();

    info!(
        name: "ws.closed",
        session_id = %session_id,
        user_id = %user_id,
        "Streaming connection closed"
    );
}

/// Parse an inbound text frame as a [`Message`].
///
/// Every field of the wire shape is required.
pub fn parse_inbound(text: &str) -> Result<Message, SyncError> {
    serde_json::from_str(text).map_err(|e| SyncError::Validation(e.to_string()))
}

async fn handle_inbound(
    sync: &SessionSynchronizer,
    connection: &Connection,
    session_id: &str,
    user_id: &str,
    text: &str,
) {
    let message = match parse_inbound(text) {
        Ok(m) => m,
        Err(e) => {
            reject(connection, &e);
            return;
        }
    };

    if message.user_id != user_id {
        debug!(
            session_id,
            connection_user = user_id,
            claimed_user = %message.user_id,
            "Inbound author differs from connection user; using connection user"
        );
    }

    if let Err(e) = sync
        .append(session_id, user_id, &message.content, message.is_answer)
        .await
    {
        reject(connection, &e);
    }
}

/// Report a rejected inbound item to this connection only.
fn reject(connection: &Connection, error: &SyncError) {
    warn!(
        name: "ws.inbound.rejected",
        connection_id = %connection.id(),
        error = %error,
        "Inbound message rejected"
    );
    connection.send(Frame::Error {
        error: error.to_string(),
    });
}
