//! WebSocket message dispatch
//!
//! Routes incoming messages to the appropriate handler.

use std::sync::Arc;

use hass_ai_alerts::DeliverySettingsUpdate;
use hass_ai_intelligence::ScanRequest;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::connection::ActiveConnection;
use super::handlers;
use super::types::{
    IncomingMessage, OutgoingMessage, PongMessage, ERR_ID_REUSE, ERR_INVALID_FORMAT,
    ERR_UNKNOWN_COMMAND,
};

impl IncomingMessage {
    fn id(&self) -> Option<u64> {
        match self {
            IncomingMessage::Auth { .. } => None,
            IncomingMessage::Ping { id }
            | IncomingMessage::ScanEntities { id, .. }
            | IncomingMessage::StopOperation { id, .. }
            | IncomingMessage::GetEntityImportance { id, .. }
            | IncomingMessage::SaveOverrides { id, .. }
            | IncomingMessage::LoadOverrides { id }
            | IncomingMessage::ResetOverrides { id, .. }
            | IncomingMessage::SaveAiResults { id, .. }
            | IncomingMessage::LoadAiResults { id }
            | IncomingMessage::GetAiLogs { id, .. }
            | IncomingMessage::FindCorrelations { id, .. }
            | IncomingMessage::GetAlertStatus { id }
            | IncomingMessage::GetAlertReport { id }
            | IncomingMessage::ConfigureAlert { id, .. }
            | IncomingMessage::UpdateAlertSettings { id, .. } => Some(*id),
        }
    }
}

/// Command types the dispatcher understands
const COMMANDS: &[&str] = &[
    "ping",
    "hass_ai/scan_entities",
    "hass_ai/stop_operation",
    "hass_ai/get_entity_importance",
    "hass_ai/save_overrides",
    "hass_ai/load_overrides",
    "hass_ai/reset_overrides",
    "hass_ai/save_ai_results",
    "hass_ai/load_ai_results",
    "hass_ai/get_ai_logs",
    "hass_ai/find_correlations",
    "hass_ai/get_alert_status",
    "hass_ai/get_alert_report",
    "hass_ai/configure_alert",
    "hass_ai/update_alert_settings",
];

/// Reply to a message that does not decode as a known command
async fn reject(text: &str, error: serde_json::Error, tx: &mpsc::Sender<OutgoingMessage>) -> Result<(), String> {
    let Ok(json) = serde_json::from_str::<Value>(text) else {
        return Err(format!("Invalid message format: {error}"));
    };
    let Some(id) = json.get("id").and_then(Value::as_u64) else {
        return Err(format!("Message without id: {error}"));
    };
    let msg_type = json.get("type").and_then(Value::as_str).unwrap_or_default();

    let reply = if COMMANDS.contains(&msg_type) {
        OutgoingMessage::error(id, ERR_INVALID_FORMAT, error.to_string())
    } else {
        warn!(msg_type, "unhandled WebSocket message type");
        OutgoingMessage::error(id, ERR_UNKNOWN_COMMAND, format!("Unknown command: {msg_type}"))
    };
    tx.send(reply).await.map_err(|e| e.to_string())
}

/// Handle an incoming message
pub async fn handle_message(
    conn: &Arc<ActiveConnection>,
    text: &str,
    tx: &mpsc::Sender<OutgoingMessage>,
) -> Result<(), String> {
    let msg: IncomingMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => return reject(text, e, tx).await,
    };

    if let Some(id) = msg.id() {
        if let Err(code) = conn.validate_id(id) {
            return tx
                .send(OutgoingMessage::error(id, ERR_ID_REUSE, "Identifier values have to increase."))
                .await
                .map_err(|_| code.to_string());
        }
    }

    match msg {
        IncomingMessage::Auth { .. } => {
            debug!("ignoring auth message on authenticated connection");
            Ok(())
        }
        IncomingMessage::Ping { id } => {
            let pong = OutgoingMessage::Pong(PongMessage {
                id,
                msg_type: "pong",
            });
            tx.send(pong).await.map_err(|e| e.to_string())
        }
        IncomingMessage::ScanEntities {
            id,
            language,
            entity_filter,
            batch_size,
        } => {
            let request = ScanRequest {
                language,
                entity_filter,
                batch_size,
            };
            handlers::handle_scan_entities(conn, id, request, tx).await
        }
        IncomingMessage::StopOperation { id, operation_id } => {
            handlers::handle_stop_operation(conn, id, operation_id.as_deref(), tx).await
        }
        IncomingMessage::GetEntityImportance {
            id,
            entity_id,
            language,
        } => handlers::handle_get_entity_importance(conn, id, &entity_id, language, tx).await,
        IncomingMessage::SaveOverrides { id, overrides } => {
            handlers::handle_save_overrides(conn, id, overrides, tx).await
        }
        IncomingMessage::LoadOverrides { id } => handlers::handle_load_overrides(conn, id, tx).await,
        IncomingMessage::ResetOverrides { id, confirm } => {
            handlers::handle_reset_overrides(conn, id, confirm, tx).await
        }
        IncomingMessage::SaveAiResults {
            id,
            results,
            timestamp,
            total_entities,
        } => handlers::handle_save_ai_results(conn, id, results, timestamp, total_entities, tx).await,
        IncomingMessage::LoadAiResults { id } => handlers::handle_load_ai_results(conn, id, tx).await,
        IncomingMessage::GetAiLogs { id, limit } => handlers::handle_get_ai_logs(conn, id, limit, tx).await,
        IncomingMessage::FindCorrelations {
            id,
            entity_id,
            language,
        } => handlers::handle_find_correlations(conn, id, &entity_id, language, tx).await,
        IncomingMessage::GetAlertStatus { id } => handlers::handle_get_alert_status(conn, id, tx).await,
        IncomingMessage::GetAlertReport { id } => handlers::handle_get_alert_report(conn, id, tx).await,
        IncomingMessage::ConfigureAlert {
            id,
            entity_id,
            thresholds,
            weight,
        } => handlers::handle_configure_alert(conn, id, &entity_id, &thresholds, weight, tx).await,
        IncomingMessage::UpdateAlertSettings {
            id,
            notification_service,
            use_input_text,
            input_text_entity,
        } => {
            let update = DeliverySettingsUpdate {
                notification_service,
                use_input_text,
                input_text_entity,
            };
            handlers::handle_update_alert_settings(conn, id, update, tx).await
        }
    }
}
