//! WebSocket connection handling
//!
//! Runs the auth handshake, then feeds every text frame to the dispatcher.
//! Replies and scan events share one outgoing channel per connection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::AppState;

use super::dispatch::handle_message;
use super::types::{
    AuthInvalidMessage, AuthOkMessage, AuthRequiredMessage, IncomingMessage, OutgoingMessage,
};

const AUTH_TIMEOUT: Duration = Duration::from_secs(10);
const OUTGOING_BUFFER: usize = 256;

/// Per-connection state
pub struct ActiveConnection {
    pub state: AppState,
    last_id: AtomicU64,
}

impl ActiveConnection {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            last_id: AtomicU64::new(0),
        }
    }

    /// Message ids must strictly increase
    pub fn validate_id(&self, id: u64) -> Result<(), &'static str> {
        let last = self.last_id.load(Ordering::SeqCst);
        if id <= last {
            return Err("id_reuse");
        }
        self.last_id.store(id, Ordering::SeqCst);
        Ok(())
    }
}

/// Handle one WebSocket connection until the client goes away
pub async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let version = env!("CARGO_PKG_VERSION").to_string();

    let auth_required = OutgoingMessage::AuthRequired(AuthRequiredMessage {
        msg_type: "auth_required",
        ha_version: version.clone(),
    });
    if let Err(e) = send_message(&mut sender, &auth_required).await {
        error!(error = %e, "failed to send auth_required");
        return;
    }

    let expected = state.api_token.clone();
    let rejection = match tokio::time::timeout(AUTH_TIMEOUT, wait_for_auth(&mut receiver)).await {
        Ok(Ok(token)) if token_accepted(expected.as_deref(), token.as_deref()) => None,
        Ok(Ok(_)) => Some("Invalid access token"),
        Ok(Err(e)) => {
            debug!(error = %e, "auth phase ended");
            Some("Expected auth message")
        }
        Err(_) => Some("Authentication timeout"),
    };

    if let Some(message) = rejection {
        let auth_invalid = OutgoingMessage::AuthInvalid(AuthInvalidMessage {
            msg_type: "auth_invalid",
            message: message.to_string(),
        });
        let _ = send_message(&mut sender, &auth_invalid).await;
        warn!(reason = message, "WebSocket client authentication failed");
        return;
    }

    let auth_ok = OutgoingMessage::AuthOk(AuthOkMessage {
        msg_type: "auth_ok",
        ha_version: version,
    });
    if let Err(e) = send_message(&mut sender, &auth_ok).await {
        error!(error = %e, "failed to send auth_ok");
        return;
    }
    info!("WebSocket client authenticated");

    let conn = Arc::new(ActiveConnection::new(state));
    let (tx, mut rx) = mpsc::channel::<OutgoingMessage>(OUTGOING_BUFFER);

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if send_message(&mut sender, &msg).await.is_err() {
                break;
            }
        }
    });

    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if let Err(e) = handle_message(&conn, &text, &tx).await {
                    error!(error = %e, "error handling message");
                }
            }
            Ok(Message::Close(_)) => {
                info!("WebSocket client disconnected");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "WebSocket error");
                break;
            }
        }
    }

    // running scans keep going and finish persisting; only their events are dropped
    drop(tx);
    send_task.abort();
    debug!("WebSocket connection closed");
}

fn token_accepted(expected: Option<&str>, given: Option<&str>) -> bool {
    match expected {
        Some(expected) => given == Some(expected),
        None => true,
    }
}

/// Wait for the `auth` message and return its token
async fn wait_for_auth(receiver: &mut SplitStream<WebSocket>) -> Result<Option<String>, String> {
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                return match serde_json::from_str::<IncomingMessage>(&text) {
                    Ok(IncomingMessage::Auth { access_token }) => Ok(access_token),
                    _ => Err("expected auth message".to_string()),
                };
            }
            Ok(Message::Close(_)) => return Err("connection closed".to_string()),
            Ok(_) => {}
            Err(e) => return Err(format!("WebSocket error: {e}")),
        }
    }
    Err("connection closed".to_string())
}

pub async fn send_message(
    sender: &mut SplitSink<WebSocket, Message>,
    msg: &OutgoingMessage,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sender
        .send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
