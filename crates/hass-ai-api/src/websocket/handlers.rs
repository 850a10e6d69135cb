//! WebSocket command handlers
//!
//! Every handler answers with exactly one `result` message. A scan also
//! streams its progress as `event` messages under the command's id.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use hass_ai_alerts::{AlertError, AlertMonitor, DeliverySettingsUpdate, Thresholds};
use hass_ai_config::check_batch_size;
use hass_ai_core::{Language, ScoreResult, MAX_WEIGHT};
use hass_ai_intelligence::{
    CorrelationError, EventSink, ScanError, ScanRequest, ScanStatus, RECENT_LIMIT,
};
use hass_ai_storage::{AiResultsData, EntityOverride, IntelligenceData, StorageError};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::AppState;

use super::connection::ActiveConnection;
use super::types::{
    OutgoingMessage, ERR_ALERTS_DISABLED, ERR_HOME_ASSISTANT, ERR_INVALID_FORMAT,
    ERR_NOT_CONFIGURED, ERR_NOT_FOUND, ERR_UNKNOWN,
};

type Tx = mpsc::Sender<OutgoingMessage>;

async fn send(tx: &Tx, msg: OutgoingMessage) -> Result<(), String> {
    tx.send(msg).await.map_err(|e| e.to_string())
}

async fn send_ok(tx: &Tx, id: u64) -> Result<(), String> {
    send(tx, OutgoingMessage::success(id, None)).await
}

async fn send_value<T: Serialize>(tx: &Tx, id: u64, value: &T) -> Result<(), String> {
    match serde_json::to_value(value) {
        Ok(value) => send(tx, OutgoingMessage::success(id, Some(value))).await,
        Err(e) => send(tx, OutgoingMessage::error(id, ERR_UNKNOWN, e.to_string())).await,
    }
}

async fn send_storage_error(tx: &Tx, id: u64, e: StorageError) -> Result<(), String> {
    error!(error = %e, "storage failure");
    send(tx, OutgoingMessage::error(id, ERR_UNKNOWN, e.to_string())).await
}

fn scan_error_code(e: &ScanError) -> &'static str {
    match e {
        ScanError::InvalidRequest(_) => ERR_INVALID_FORMAT,
        ScanError::EntityNotFound(_) => ERR_NOT_FOUND,
        ScanError::NotConfigured => ERR_NOT_CONFIGURED,
        ScanError::Correlation(CorrelationError::EntityNotFound(_)) => ERR_NOT_FOUND,
        ScanError::Correlation(CorrelationError::Agent(_)) => ERR_HOME_ASSISTANT,
        ScanError::Correlation(_) => ERR_UNKNOWN,
    }
}

fn alert_error_code(e: &AlertError) -> &'static str {
    match e {
        AlertError::InvalidEntity(_)
        | AlertError::InvalidThreshold { .. }
        | AlertError::NoThresholds(_)
        | AlertError::InvalidWeight(_) => ERR_INVALID_FORMAT,
        AlertError::Delivery(_) => ERR_HOME_ASSISTANT,
        AlertError::Template(_) | AlertError::Storage(_) => ERR_UNKNOWN,
    }
}

// =============================================================================
// Scan Handlers
// =============================================================================

/// Handle hass_ai/scan_entities
///
/// Acknowledges with the operation id right away; the scan runs in its own
/// task and reports through events, ending with `scan_complete`.
pub async fn handle_scan_entities(
    conn: &Arc<ActiveConnection>,
    id: u64,
    request: ScanRequest,
    tx: &Tx,
) -> Result<(), String> {
    if let Some(Err(e)) = request.batch_size.map(check_batch_size) {
        return send(tx, OutgoingMessage::error(id, ERR_INVALID_FORMAT, e.to_string())).await;
    }

    let state = conn.state.clone();
    let (operation_id, cancel) = state.operations.start();
    send_value(tx, id, &json!({"operation_id": operation_id})).await?;

    let (sink, mut events) = EventSink::channel();
    let forward_tx = tx.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let Ok(payload) = serde_json::to_value(&event) else {
                continue;
            };
            if forward_tx.send(OutgoingMessage::event(id, payload)).await.is_err() {
                debug!("client gone, dropping scan events");
                break;
            }
        }
    });

    tokio::spawn(async move {
        match state.scanner.scan(request, &sink, &cancel).await {
            Ok(outcome) => {
                info!(
                    operation_id = %operation_id,
                    status = ?outcome.status,
                    results = outcome.results.len(),
                    "scan finished"
                );
                if outcome.status != ScanStatus::Cancelled {
                    state.refresh_alerts().await;
                }
            }
            Err(e) => error!(operation_id = %operation_id, error = %e, "scan failed"),
        }
        drop(sink);
        state.operations.finish(&operation_id);
        let _ = forwarder.await;
    });
    Ok(())
}

/// Handle hass_ai/stop_operation; without an id every running scan stops
pub async fn handle_stop_operation(
    conn: &Arc<ActiveConnection>,
    id: u64,
    operation_id: Option<&str>,
    tx: &Tx,
) -> Result<(), String> {
    let operations = &conn.state.operations;
    let stopped = match operation_id {
        Some(op) => usize::from(operations.cancel(op)),
        None => operations.cancel_all(),
    };
    send_value(tx, id, &json!({"stopped": stopped})).await
}

pub async fn handle_get_entity_importance(
    conn: &Arc<ActiveConnection>,
    id: u64,
    entity_id: &str,
    language: Option<Language>,
    tx: &Tx,
) -> Result<(), String> {
    match conn.state.scanner.score_entity(entity_id, language).await {
        Ok(result) => send_value(tx, id, &result).await,
        Err(e) => send(tx, OutgoingMessage::error(id, scan_error_code(&e), e.to_string())).await,
    }
}

pub async fn handle_find_correlations(
    conn: &Arc<ActiveConnection>,
    id: u64,
    entity_id: &str,
    language: Option<Language>,
    tx: &Tx,
) -> Result<(), String> {
    match conn.state.scanner.find_correlations(entity_id, language).await {
        Ok(correlations) => send_value(tx, id, &correlations).await,
        Err(e) => {
            warn!(entity_id, error = %e, "correlation lookup failed");
            send(tx, OutgoingMessage::error(id, scan_error_code(&e), e.to_string())).await
        }
    }
}

pub async fn handle_get_ai_logs(
    conn: &Arc<ActiveConnection>,
    id: u64,
    limit: Option<usize>,
    tx: &Tx,
) -> Result<(), String> {
    let limit = limit.unwrap_or(RECENT_LIMIT).min(RECENT_LIMIT);
    let entries = conn.state.scanner.logger().recent(limit).await;
    send_value(tx, id, &entries).await
}

// =============================================================================
// Override Handlers
// =============================================================================

pub async fn handle_save_overrides(
    conn: &Arc<ActiveConnection>,
    id: u64,
    overrides: BTreeMap<String, EntityOverride>,
    tx: &Tx,
) -> Result<(), String> {
    if let Some((entity_id, weight)) = overrides
        .iter()
        .find_map(|(e, o)| o.overall_weight.filter(|w| *w > MAX_WEIGHT).map(|w| (e, w)))
    {
        let message = format!("weight {weight} of {entity_id} is outside 0..={MAX_WEIGHT}");
        return send(tx, OutgoingMessage::error(id, ERR_INVALID_FORMAT, message)).await;
    }

    let storage = &conn.state.storage;
    let mut data = match storage.load::<IntelligenceData>().await {
        Ok(data) => data,
        Err(e) => return send_storage_error(tx, id, e).await,
    };
    let count = overrides.len();
    data.overrides = overrides;
    if let Err(e) = storage.save(&data).await {
        return send_storage_error(tx, id, e).await;
    }
    info!(count, "saved overrides");

    conn.state.refresh_alerts().await;
    send_ok(tx, id).await
}

pub async fn handle_load_overrides(conn: &Arc<ActiveConnection>, id: u64, tx: &Tx) -> Result<(), String> {
    match conn.state.storage.load::<IntelligenceData>().await {
        Ok(data) => send_value(tx, id, &data.overrides).await,
        Err(e) => send_storage_error(tx, id, e).await,
    }
}

/// Handle hass_ai/reset_overrides; requires `confirm: true`
pub async fn handle_reset_overrides(
    conn: &Arc<ActiveConnection>,
    id: u64,
    confirm: bool,
    tx: &Tx,
) -> Result<(), String> {
    if !confirm {
        return send(
            tx,
            OutgoingMessage::error(id, ERR_INVALID_FORMAT, "Reset requires confirm: true"),
        )
        .await;
    }

    let storage = &conn.state.storage;
    let mut data = match storage.load::<IntelligenceData>().await {
        Ok(data) => data,
        Err(e) => return send_storage_error(tx, id, e).await,
    };
    let cleared = data.overrides.len();
    data.overrides.clear();
    if let Err(e) = storage.save(&data).await {
        return send_storage_error(tx, id, e).await;
    }
    info!(cleared, "reset overrides");

    conn.state.refresh_alerts().await;
    send_ok(tx, id).await
}

// =============================================================================
// Result Handlers
// =============================================================================

pub async fn handle_save_ai_results(
    conn: &Arc<ActiveConnection>,
    id: u64,
    results: IndexMap<String, ScoreResult>,
    timestamp: Option<String>,
    total_entities: Option<usize>,
    tx: &Tx,
) -> Result<(), String> {
    let data = AiResultsData {
        total_entities: total_entities.unwrap_or(results.len()),
        last_scan_timestamp: Some(timestamp.unwrap_or_else(|| Utc::now().to_rfc3339())),
        results,
    };
    if let Err(e) = conn.state.storage.save(&data).await {
        return send_storage_error(tx, id, e).await;
    }
    debug!(count = data.results.len(), "saved AI results");
    send_ok(tx, id).await
}

pub async fn handle_load_ai_results(conn: &Arc<ActiveConnection>, id: u64, tx: &Tx) -> Result<(), String> {
    match conn.state.storage.load::<AiResultsData>().await {
        Ok(data) => send_value(tx, id, &data).await,
        Err(e) => send_storage_error(tx, id, e).await,
    }
}

// =============================================================================
// Alert Handlers
// =============================================================================

async fn alert_monitor<'a>(
    conn: &'a Arc<ActiveConnection>,
    id: u64,
    tx: &Tx,
) -> Result<Option<&'a Arc<AlertMonitor>>, String> {
    match &conn.state.alerts {
        Some(alerts) => Ok(Some(alerts)),
        None => {
            send(
                tx,
                OutgoingMessage::error(id, ERR_ALERTS_DISABLED, "Alert monitoring is disabled"),
            )
            .await?;
            Ok(None)
        }
    }
}

pub async fn handle_get_alert_status(conn: &Arc<ActiveConnection>, id: u64, tx: &Tx) -> Result<(), String> {
    let Some(alerts) = alert_monitor(conn, id, tx).await? else {
        return Ok(());
    };
    send_value(tx, id, &alerts.status().await).await
}

pub async fn handle_get_alert_report(conn: &Arc<ActiveConnection>, id: u64, tx: &Tx) -> Result<(), String> {
    let Some(alerts) = alert_monitor(conn, id, tx).await? else {
        return Ok(());
    };
    send_value(tx, id, &alerts.report().await).await
}

pub async fn handle_configure_alert(
    conn: &Arc<ActiveConnection>,
    id: u64,
    entity_id: &str,
    thresholds: &Value,
    weight: Option<u8>,
    tx: &Tx,
) -> Result<(), String> {
    let Some(alerts) = alert_monitor(conn, id, tx).await? else {
        return Ok(());
    };
    let result = match Thresholds::from_json(thresholds) {
        Ok(thresholds) => alerts.configure_alert(entity_id, thresholds, weight).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => send_ok(tx, id).await,
        Err(e) => send(tx, OutgoingMessage::error(id, alert_error_code(&e), e.to_string())).await,
    }
}

pub async fn handle_update_alert_settings(
    conn: &Arc<ActiveConnection>,
    id: u64,
    update: DeliverySettingsUpdate,
    tx: &Tx,
) -> Result<(), String> {
    let Some(alerts) = alert_monitor(conn, id, tx).await? else {
        return Ok(());
    };
    match alerts.update_delivery(update).await {
        Ok(()) => send_ok(tx, id).await,
        Err(e) => send(tx, OutgoingMessage::error(id, alert_error_code(&e), e.to_string())).await,
    }
}
