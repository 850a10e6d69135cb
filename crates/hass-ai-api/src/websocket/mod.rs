//! HASS AI WebSocket API
//!
//! Follows the Home Assistant WebSocket protocol: `auth_required`, `auth`,
//! `auth_ok`/`auth_invalid`, then commands carrying increasing ids.
//!
//! - `types` - incoming and outgoing message definitions
//! - `connection` - connection lifecycle and authentication
//! - `dispatch` - message routing
//! - `handlers` - one handler per `hass_ai/*` command

mod connection;
mod dispatch;
mod handlers;
mod types;

use axum::{
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
};

use crate::AppState;

pub use types::{
    ErrorInfo, EventMessage, IncomingMessage, OutgoingMessage, PongMessage, ResultMessage,
};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_socket(socket, state))
}
