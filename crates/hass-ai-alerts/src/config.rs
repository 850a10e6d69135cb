//! Persisted alert configuration (`hass_ai_alert_config`)

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use hass_ai_storage::{Storable, KEY_ALERT_CONFIG, STORAGE_VERSION};
use serde::{Deserialize, Serialize};

use crate::threshold::Thresholds;
use crate::AlertLevel;

pub const DEFAULT_NOTIFICATION_SERVICE: &str = "notify.notify";
pub const DEFAULT_INPUT_TEXT_ENTITY: &str = "input_text.hass_ai_alerts";
pub const DEFAULT_WEIGHT: u8 = 3;

/// Monitoring state of one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredEntity {
    #[serde(default = "default_weight")]
    pub weight: u8,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default = "default_entity_type")]
    pub entity_type: String,
    #[serde(default)]
    pub last_check: Option<DateTime<Utc>>,
    #[serde(default)]
    pub current_level: Option<AlertLevel>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_weight() -> u8 {
    DEFAULT_WEIGHT
}

fn default_entity_type() -> String {
    "generic".to_string()
}

fn default_enabled() -> bool {
    true
}

impl MonitoredEntity {
    pub fn new(weight: u8, thresholds: Thresholds, entity_type: impl Into<String>) -> Self {
        Self {
            weight,
            thresholds,
            entity_type: entity_type.into(),
            last_check: None,
            current_level: None,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertConfigData {
    #[serde(default = "default_notification_service")]
    pub notification_service: String,
    #[serde(default)]
    pub use_input_text: bool,
    #[serde(default = "default_input_text_entity")]
    pub input_text_entity: String,
    #[serde(default)]
    pub monitored_entities: BTreeMap<String, MonitoredEntity>,
    #[serde(default)]
    pub last_update: Option<DateTime<Utc>>,
}

fn default_notification_service() -> String {
    DEFAULT_NOTIFICATION_SERVICE.to_string()
}

fn default_input_text_entity() -> String {
    DEFAULT_INPUT_TEXT_ENTITY.to_string()
}

impl Default for AlertConfigData {
    fn default() -> Self {
        Self {
            notification_service: default_notification_service(),
            use_input_text: false,
            input_text_entity: default_input_text_entity(),
            monitored_entities: BTreeMap::new(),
            last_update: None,
        }
    }
}

impl Storable for AlertConfigData {
    const KEY: &'static str = KEY_ALERT_CONFIG;
    const VERSION: u32 = STORAGE_VERSION;
}

/// Delivery settings a client may change; unset fields are left alone
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DeliverySettingsUpdate {
    #[serde(default)]
    pub notification_service: Option<String>,
    #[serde(default)]
    pub use_input_text: Option<bool>,
    #[serde(default)]
    pub input_text_entity: Option<String>,
}

impl AlertConfigData {
    pub fn apply(&mut self, update: DeliverySettingsUpdate) {
        if let Some(service) = update.notification_service.filter(|s| !s.trim().is_empty()) {
            self.notification_service = service;
        }
        if let Some(flag) = update.use_input_text {
            self.use_input_text = flag;
        }
        if let Some(entity) = update.input_text_entity.filter(|s| !s.trim().is_empty()) {
            self.input_text_entity = entity;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_from_empty_object() {
        let data: AlertConfigData = serde_json::from_value(json!({})).unwrap();
        assert_eq!(data, AlertConfigData::default());
        assert_eq!(data.notification_service, "notify.notify");
    }

    #[test]
    fn test_monitored_entity_defaults() {
        let data: AlertConfigData = serde_json::from_value(json!({
            "monitored_entities": {"sensor.battery_1": {"thresholds": {"WARNING": 20}}}
        }))
        .unwrap();
        let entity = &data.monitored_entities["sensor.battery_1"];
        assert_eq!(entity.weight, 3);
        assert!(entity.enabled);
        assert_eq!(entity.thresholds.len(), 1);
    }

    #[test]
    fn test_apply_update_ignores_blank_fields() {
        let mut data = AlertConfigData::default();
        data.apply(DeliverySettingsUpdate {
            notification_service: Some("notify.mobile_app_phone".into()),
            use_input_text: Some(true),
            input_text_entity: Some("  ".into()),
        });
        assert_eq!(data.notification_service, "notify.mobile_app_phone");
        assert!(data.use_input_text);
        assert_eq!(data.input_text_entity, DEFAULT_INPUT_TEXT_ENTITY);
    }
}
