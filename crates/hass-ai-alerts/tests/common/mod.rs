//! Shared fixtures for the alert monitor tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use hass_ai_alerts::AlertMonitor;
use hass_ai_config::AlertSettings;
use hass_ai_core::{
    Category, CategorySet, EntitySnapshot, Language, ManagementType, Method, ScoreResult,
};
use hass_ai_hub::{Hub, ServiceCall};
use hass_ai_storage::Storage;
use serde_json::Value;
use tempfile::TempDir;

pub struct Fixture {
    pub hub: Hub,
    pub storage: Arc<Storage>,
    pub calls: Arc<Mutex<Vec<ServiceCall>>>,
    _dir: TempDir,
}

impl Fixture {
    /// Hub with recording `notify.notify`, `notify.mobile_app_phone` and
    /// `input_text.set_value` services
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let hub = Hub::new();
        let calls = Arc::new(Mutex::new(Vec::new()));
        for (domain, service) in [
            ("notify", "notify"),
            ("notify", "mobile_app_phone"),
            ("input_text", "set_value"),
        ] {
            let sink = calls.clone();
            hub.services.register(domain, service, move |call| {
                let sink = sink.clone();
                async move {
                    sink.lock().unwrap().push(call);
                    Ok(None)
                }
            });
        }
        Self {
            storage: Arc::new(Storage::new(dir.path())),
            hub,
            calls,
            _dir: dir,
        }
    }

    pub fn monitor(&self, settings: AlertSettings) -> AlertMonitor {
        AlertMonitor::new(
            self.hub.states.clone(),
            self.hub.services.clone(),
            self.hub.bus.clone(),
            self.storage.clone(),
            settings,
            Language::En,
        )
        .unwrap()
    }

    pub fn set(&self, entity: EntitySnapshot) {
        self.hub.states.set(entity);
    }

    pub fn calls(&self) -> Vec<ServiceCall> {
        self.calls.lock().unwrap().clone()
    }
}

pub fn entity(id: &str, state: &str, attributes: &[(&str, &str)]) -> EntitySnapshot {
    let attributes: HashMap<String, Value> = attributes
        .iter()
        .map(|(k, v)| (k.to_string(), Value::from(*v)))
        .collect();
    EntitySnapshot::new(id.parse().unwrap(), state, attributes)
}

pub fn battery(id: &str, level: &str) -> EntitySnapshot {
    entity(
        id,
        level,
        &[
            ("device_class", "battery"),
            ("unit_of_measurement", "%"),
            ("friendly_name", "Phone Battery"),
        ],
    )
}

pub fn alerts_result(id: &str, weight: u8) -> ScoreResult {
    ScoreResult::new(
        id.parse().unwrap(),
        weight,
        "worth watching",
        CategorySet::from_iter([Category::Data, Category::Alerts]),
        ManagementType::User,
        Method::Ai,
        1,
    )
}

pub fn data_result(id: &str, weight: u8) -> ScoreResult {
    ScoreResult::new(
        id.parse().unwrap(),
        weight,
        "plain reading",
        CategorySet::single(Category::Data),
        ManagementType::User,
        Method::Ai,
        1,
    )
}
