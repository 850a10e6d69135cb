//! Serializable views of the monitor's state for the panel

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::threshold::Thresholds;
use crate::AlertLevel;

#[derive(Debug, Clone, Serialize)]
pub struct EntityStatus {
    pub friendly_name: String,
    pub current_value: String,
    pub unit: String,
    pub device_class: String,
    pub weight: u8,
    pub thresholds: Thresholds,
    pub entity_type: String,
    pub last_check: Option<DateTime<Utc>>,
    pub enabled: bool,
    pub is_alert: bool,
    pub alert_level: Option<AlertLevel>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActiveAlert {
    pub level: AlertLevel,
    pub value: String,
    pub weight: u8,
    pub thresholds: Thresholds,
    pub friendly_name: String,
    pub unit: String,
}

/// Answer to `hass_ai/get_alert_status`
#[derive(Debug, Clone, Serialize)]
pub struct AlertStatus {
    pub monitoring_enabled: bool,
    pub total_monitored: usize,
    pub active_alerts: BTreeMap<String, ActiveAlert>,
    pub all_alert_entities: BTreeMap<String, EntityStatus>,
    pub notification_service: String,
    pub use_input_text: bool,
    pub input_text_entity: String,
    pub input_text_exists: bool,
    pub last_check: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntityReport {
    pub entity_id: String,
    pub friendly_name: String,
    pub domain: String,
    pub current_state: String,
    pub unit: String,
    pub device_class: String,
    pub weight: u8,
    pub entity_type: String,
    pub thresholds: Thresholds,
    pub enabled: bool,
    pub last_check: Option<DateTime<Utc>>,
    pub current_alert_level: Option<AlertLevel>,
    pub is_valid_state: bool,
    pub state_attributes: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlertSummary {
    pub total_entities: usize,
    pub enabled_entities: usize,
    pub active_alerts: usize,
    pub critical_alerts: usize,
    pub alert_alerts: usize,
    pub warning_alerts: usize,
}

impl AlertSummary {
    pub fn count(&mut self, enabled: bool, level: Option<AlertLevel>) {
        self.total_entities += 1;
        if enabled {
            self.enabled_entities += 1;
        }
        if let Some(level) = level {
            self.active_alerts += 1;
            match level {
                AlertLevel::Critical => self.critical_alerts += 1,
                AlertLevel::Alert => self.alert_alerts += 1,
                AlertLevel::Warning => self.warning_alerts += 1,
            }
        }
    }
}

/// Answer to `hass_ai/get_alert_report`
#[derive(Debug, Clone, Serialize)]
pub struct AlertReport {
    pub timestamp: DateTime<Utc>,
    pub monitoring_enabled: bool,
    pub monitored_entities: BTreeMap<String, EntityReport>,
    pub alert_summary: AlertSummary,
}
