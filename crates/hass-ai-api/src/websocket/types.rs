//! WebSocket message types

use std::collections::BTreeMap;

use hass_ai_core::{Language, ScoreResult};
use hass_ai_storage::EntityOverride;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

// =============================================================================
// Incoming Messages
// =============================================================================

/// Incoming WebSocket message from the panel
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IncomingMessage {
    Auth {
        #[serde(default)]
        access_token: Option<String>,
    },
    Ping {
        id: u64,
    },
    #[serde(rename = "hass_ai/scan_entities")]
    ScanEntities {
        id: u64,
        #[serde(default)]
        language: Option<Language>,
        #[serde(default)]
        entity_filter: Option<String>,
        #[serde(default)]
        batch_size: Option<usize>,
    },
    #[serde(rename = "hass_ai/stop_operation")]
    StopOperation {
        id: u64,
        #[serde(default)]
        operation_id: Option<String>,
    },
    #[serde(rename = "hass_ai/get_entity_importance")]
    GetEntityImportance {
        id: u64,
        entity_id: String,
        #[serde(default)]
        language: Option<Language>,
    },
    #[serde(rename = "hass_ai/save_overrides")]
    SaveOverrides {
        id: u64,
        overrides: BTreeMap<String, EntityOverride>,
    },
    #[serde(rename = "hass_ai/load_overrides")]
    LoadOverrides {
        id: u64,
    },
    #[serde(rename = "hass_ai/reset_overrides")]
    ResetOverrides {
        id: u64,
        #[serde(default)]
        confirm: bool,
    },
    #[serde(rename = "hass_ai/save_ai_results")]
    SaveAiResults {
        id: u64,
        results: IndexMap<String, ScoreResult>,
        #[serde(default)]
        timestamp: Option<String>,
        #[serde(default)]
        total_entities: Option<usize>,
    },
    #[serde(rename = "hass_ai/load_ai_results")]
    LoadAiResults {
        id: u64,
    },
    #[serde(rename = "hass_ai/get_ai_logs")]
    GetAiLogs {
        id: u64,
        #[serde(default)]
        limit: Option<usize>,
    },
    #[serde(rename = "hass_ai/find_correlations")]
    FindCorrelations {
        id: u64,
        entity_id: String,
        #[serde(default)]
        language: Option<Language>,
    },
    #[serde(rename = "hass_ai/get_alert_status")]
    GetAlertStatus {
        id: u64,
    },
    #[serde(rename = "hass_ai/get_alert_report")]
    GetAlertReport {
        id: u64,
    },
    #[serde(rename = "hass_ai/configure_alert")]
    ConfigureAlert {
        id: u64,
        entity_id: String,
        thresholds: serde_json::Value,
        #[serde(default)]
        weight: Option<u8>,
    },
    #[serde(rename = "hass_ai/update_alert_settings")]
    UpdateAlertSettings {
        id: u64,
        #[serde(default)]
        notification_service: Option<String>,
        #[serde(default)]
        use_input_text: Option<bool>,
        #[serde(default)]
        input_text_entity: Option<String>,
    },
}

// =============================================================================
// Outgoing Messages
// =============================================================================

/// Outgoing WebSocket message to the panel
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum OutgoingMessage {
    AuthRequired(AuthRequiredMessage),
    AuthOk(AuthOkMessage),
    AuthInvalid(AuthInvalidMessage),
    Pong(PongMessage),
    Result(ResultMessage),
    Event(EventMessage),
}

impl OutgoingMessage {
    pub fn success(id: u64, result: Option<serde_json::Value>) -> Self {
        OutgoingMessage::Result(ResultMessage {
            id,
            msg_type: "result",
            success: true,
            result,
            error: None,
        })
    }

    pub fn error(id: u64, code: &str, message: impl Into<String>) -> Self {
        OutgoingMessage::Result(ResultMessage {
            id,
            msg_type: "result",
            success: false,
            result: None,
            error: Some(ErrorInfo {
                code: code.to_string(),
                message: message.into(),
            }),
        })
    }

    pub fn event(id: u64, event: serde_json::Value) -> Self {
        OutgoingMessage::Event(EventMessage {
            id,
            msg_type: "event",
            event,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct AuthRequiredMessage {
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    pub ha_version: String,
}

#[derive(Debug, Serialize)]
pub struct AuthOkMessage {
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    pub ha_version: String,
}

#[derive(Debug, Serialize)]
pub struct AuthInvalidMessage {
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct PongMessage {
    pub id: u64,
    #[serde(rename = "type")]
    pub msg_type: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ResultMessage {
    pub id: u64,
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Serialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct EventMessage {
    pub id: u64,
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    pub event: serde_json::Value,
}

// =============================================================================
// Error Codes
// =============================================================================

pub const ERR_ID_REUSE: &str = "id_reuse";
pub const ERR_INVALID_FORMAT: &str = "invalid_format";
pub const ERR_UNKNOWN_COMMAND: &str = "unknown_command";
pub const ERR_NOT_FOUND: &str = "not_found";
pub const ERR_NOT_CONFIGURED: &str = "not_configured";
pub const ERR_ALERTS_DISABLED: &str = "alerts_disabled";
pub const ERR_HOME_ASSISTANT: &str = "home_assistant_error";
pub const ERR_UNKNOWN: &str = "unknown_error";
