//! Which entities can be monitored, and how their values are read
//!
//! Only entities with numeric, boolean or otherwise predictable states make
//! sense for threshold alerts; free-text and highly variable domains are
//! rejected outright.

use hass_ai_core::EntitySnapshot;

use crate::threshold::{Observed, ThresholdValue, Thresholds};
use crate::AlertLevel;

/// Domains never monitored
pub const ALERT_EXCLUDED_DOMAINS: &[&str] = &[
    "input_text",
    "input_datetime",
    "input_select",
    "device_tracker",
    "person",
    "zone",
    "weather",
    "media_player",
    "calendar",
    "image",
    "camera",
    "tts",
    "conversation",
    "persistent_notification",
    "automation",
    "script",
    "scene",
    "group",
    "remote",
    "vacuum",
    "timer",
    "counter",
    "input_number",
    "input_boolean",
    "sun",
    "updater",
];

const MEASURED_DEVICE_CLASSES: &[&str] = &[
    "temperature",
    "humidity",
    "pressure",
    "illuminance",
    "power",
    "energy",
];
const MEASURED_KEYWORDS: &[&str] = &["co2", "aqi", "pm", "noise", "signal"];
const TEXT_KEYWORDS: &[&str] = &["status", "mode", "text", "message", "name"];
const HEALTH_KEYWORDS: &[&str] = &["heart", "oxygen", "blood", "steps"];

const BINARY_DEVICE_CLASSES: &[&str] = &[
    "door",
    "window",
    "motion",
    "smoke",
    "gas",
    "moisture",
    "safety",
    "connectivity",
    "update",
    "problem",
];
const BINARY_KEYWORDS: &[&str] = &["open", "closed", "detected", "alarm", "alert"];
const SWITCH_KEYWORDS: &[&str] = &["security", "alarm", "emergency", "safety"];
const LIGHT_KEYWORDS: &[&str] = &["emergency", "alarm", "indicator", "warning"];

const LOW_VALUE_KEYWORDS: &[&str] = &[
    "battery",
    "batteria",
    "power_level",
    "signal",
    "rssi",
    "wifi",
    "segnale",
    "strength",
    "available",
    "free",
    "remaining",
    "libero",
    "disponibile",
    "uptime",
    "connectivity",
    "connettivita",
    "ink",
    "toner",
    "cartridge",
    "cartuccia",
];
const LOW_VALUE_DEVICE_CLASSES: &[&str] = &["battery", "signal_strength", "power"];
const PERCENT_LOW_KEYWORDS: &[&str] = &["battery", "signal", "storage", "disk", "available", "free"];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Whether `entity` is suitable for threshold monitoring
pub fn is_valid_alert_entity(entity: &EntitySnapshot) -> bool {
    if ALERT_EXCLUDED_DOMAINS.contains(&entity.domain.as_str()) || entity.is_unavailable() {
        return false;
    }

    let id = entity.entity_id.as_str().to_lowercase();
    let device_class = entity.device_class().unwrap_or_default();
    let numeric = entity.numeric_state().is_some();

    match entity.domain.as_str() {
        "sensor" => {
            if device_class == "battery" || id.contains("battery") {
                true
            } else if MEASURED_DEVICE_CLASSES.contains(&device_class) {
                true
            } else if entity.unit().is_some_and(|u| !u.is_empty()) && numeric {
                true
            } else if contains_any(&id, MEASURED_KEYWORDS) {
                numeric
            } else if contains_any(&id, TEXT_KEYWORDS) {
                false
            } else {
                contains_any(&id, HEALTH_KEYWORDS) && numeric
            }
        }
        "binary_sensor" => {
            BINARY_DEVICE_CLASSES.contains(&device_class) || contains_any(&id, BINARY_KEYWORDS)
        }
        "switch" => contains_any(&id, SWITCH_KEYWORDS),
        "light" => contains_any(&id, LIGHT_KEYWORDS),
        _ => false,
    }
}

/// Whether low values of `entity` are the problem (battery, signal, free space)
pub fn alerts_on_low(entity: &EntitySnapshot) -> bool {
    let id = entity.entity_id.as_str().to_lowercase();
    if contains_any(&id, LOW_VALUE_KEYWORDS) {
        return true;
    }
    if id.contains("air_quality") && !id.contains("poor") {
        return true;
    }
    let device_class = entity.device_class().unwrap_or_default().to_lowercase();
    if LOW_VALUE_DEVICE_CLASSES.contains(&device_class.as_str()) {
        return true;
    }
    let unit = entity.unit().unwrap_or_default().to_lowercase();
    matches!(unit.as_str(), "%" | "percent") && contains_any(&id, PERCENT_LOW_KEYWORDS)
}

/// Coarse type label stored with a monitored entity
pub fn entity_type(entity_id: &str) -> &'static str {
    const TYPES: &[(&[&str], &str)] = &[
        (&["temp", "temperature"], "temperature"),
        (&["humid", "moisture"], "humidity"),
        (&["batt", "battery"], "battery"),
        (&["co2", "carbon"], "co2"),
        (&["pressure", "press"], "pressure"),
        (&["door", "porta"], "door"),
        (&["window", "finestra"], "window"),
        (&["motion", "movimento", "pir"], "motion"),
        (&["smoke", "fumo"], "smoke"),
        (&["gas", "leak"], "gas"),
        (&["security", "alarm"], "security"),
        (&["emergency", "emer"], "emergency"),
    ];
    let id = entity_id.to_lowercase();
    TYPES
        .iter()
        .find(|(terms, _)| contains_any(&id, terms))
        .map(|(_, label)| *label)
        .unwrap_or("generic")
}

/// Default thresholds for an entity the user has not configured
///
/// Binary sensors alert when on, switches and lights when off. Numeric
/// sensors alert at 20/10/5 when low values matter, otherwise at 1.2, 1.5
/// and 2 times the current value.
pub fn auto_thresholds(entity: &EntitySnapshot) -> Option<Thresholds> {
    match entity.domain.as_str() {
        "binary_sensor" => Some(Thresholds::uniform(ThresholdValue::Bool(true))),
        "switch" | "light" => Some(Thresholds::uniform(ThresholdValue::Bool(false))),
        "sensor" => {
            let Some(Observed::Number(current)) = Observed::from_snapshot(entity) else {
                return None;
            };
            if alerts_on_low(entity) {
                Some(
                    Thresholds::new()
                        .with(AlertLevel::Warning, ThresholdValue::number(20.0))
                        .with(AlertLevel::Alert, ThresholdValue::number(10.0))
                        .with(AlertLevel::Critical, ThresholdValue::number(5.0)),
                )
            } else if current > 0.0 {
                Some(
                    Thresholds::new()
                        .with(AlertLevel::Warning, ThresholdValue::number(current * 1.2))
                        .with(AlertLevel::Alert, ThresholdValue::number(current * 1.5))
                        .with(AlertLevel::Critical, ThresholdValue::number(current * 2.0)),
                )
            } else {
                None
            }
        }
        _ => None,
    }
}
