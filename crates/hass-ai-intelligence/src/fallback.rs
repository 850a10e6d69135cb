//! Deterministic classification used when the agent cannot score an entity
//!
//! Rules are evaluated in order:
//!
//! 1. unavailable / unknown / error state: `{ALERTS}`, SERVICE, nothing else applies
//! 2. battery entities add `{DATA, ALERTS}`, USER
//! 3. `update` entities add `{DATA, ALERTS}`, SERVICE
//! 4. the first matching domain rule adds its categories
//!
//! Categories from rules 2-4 accumulate; the management type comes from the
//! first rule that sets one.

use hass_ai_core::{Category, CategorySet, EntitySnapshot, ManagementType, Method, ScoreResult};

/// Weight of domains without an entry in [`DOMAIN_WEIGHTS`]
pub const DEFAULT_DOMAIN_WEIGHT: u8 = 2;

/// Base importance by domain
pub const DOMAIN_WEIGHTS: &[(&str, u8)] = &[
    ("alarm_control_panel", 5),
    ("lock", 5),
    ("siren", 4),
    ("climate", 4),
    ("water_heater", 3),
    ("light", 3),
    ("switch", 3),
    ("cover", 3),
    ("valve", 3),
    ("binary_sensor", 3),
    ("camera", 3),
    ("person", 3),
    ("sensor", 2),
    ("fan", 2),
    ("media_player", 2),
    ("vacuum", 2),
    ("device_tracker", 2),
    ("update", 2),
    ("automation", 2),
    ("script", 2),
    ("scene", 2),
    ("input_boolean", 2),
    ("weather", 1),
    ("zone", 1),
    ("sun", 1),
];

const HEALTH_ENV_KEYWORDS: &[&str] = &[
    "temperature",
    "temp",
    "humidity",
    "humid",
    "co2",
    "carbon",
    "air_quality",
    "aqi",
    "pm25",
    "pm2_5",
    "pm10",
    "voc",
    "smoke",
    "gas",
    "leak",
    "flood",
    "moisture",
    "water",
    "pressure",
    "radon",
    "noise",
    "heart",
    "pulse",
    "oxygen",
    "spo2",
    "blood",
    "health",
];

const HEALTH_ENV_DEVICE_CLASSES: &[&str] = &[
    "temperature",
    "humidity",
    "carbon_dioxide",
    "carbon_monoxide",
    "smoke",
    "gas",
    "moisture",
    "problem",
    "safety",
    "pm25",
    "pm10",
    "aqi",
    "volatile_organic_compounds",
    "pressure",
];

struct AttributeRule {
    label: &'static str,
    matches: fn(&EntitySnapshot) -> bool,
    categories: &'static [Category],
    management: ManagementType,
}

const ATTRIBUTE_RULES: &[AttributeRule] = &[
    AttributeRule {
        label: "battery level worth preventive maintenance alerts",
        matches: is_battery,
        categories: &[Category::Data, Category::Alerts],
        management: ManagementType::User,
    },
    AttributeRule {
        label: "software update status",
        matches: |e| e.domain == "update",
        categories: &[Category::Data, Category::Alerts],
        management: ManagementType::Service,
    },
];

struct DomainRule {
    domains: &'static [&'static str],
    label: &'static str,
    categories: &'static [Category],
    management: ManagementType,
}

const DOMAIN_RULES: &[DomainRule] = &[
    DomainRule {
        domains: &["camera"],
        label: "camera feed handled by the system",
        categories: &[Category::Data],
        management: ManagementType::Service,
    },
    DomainRule {
        domains: &["sensor", "binary_sensor"],
        label: "sensor reading",
        categories: &[Category::Data],
        management: ManagementType::User,
    },
    DomainRule {
        domains: &["switch", "light", "climate", "cover", "fan", "media_player"],
        label: "user-controlled device",
        categories: &[Category::Control],
        management: ManagementType::User,
    },
    DomainRule {
        domains: &["lock", "alarm_control_panel"],
        label: "security device",
        categories: &[Category::Control],
        management: ManagementType::Service,
    },
    DomainRule {
        domains: &["conversation"],
        label: "conversation agent",
        categories: &[Category::Control],
        management: ManagementType::Service,
    },
];

static DEFAULT_DOMAIN_RULE: DomainRule = DomainRule {
    domains: &[],
    label: "general information",
    categories: &[Category::Data],
    management: ManagementType::User,
};

pub fn domain_weight(domain: &str) -> u8 {
    DOMAIN_WEIGHTS
        .iter()
        .find(|(d, _)| *d == domain)
        .map(|(_, w)| *w)
        .unwrap_or(DEFAULT_DOMAIN_WEIGHT)
}

fn is_battery(entity: &EntitySnapshot) -> bool {
    matches!(entity.device_class(), Some("battery" | "battery_charging"))
        || entity.entity_id.object_id().contains("battery")
        || entity.friendly_name.to_lowercase().contains("battery")
}

fn is_health_or_environment(entity: &EntitySnapshot) -> bool {
    if entity
        .device_class()
        .is_some_and(|dc| HEALTH_ENV_DEVICE_CLASSES.contains(&dc))
    {
        return true;
    }
    let haystack = format!(
        "{} {}",
        entity.entity_id.object_id(),
        entity.friendly_name.to_lowercase()
    );
    let words: Vec<&str> = haystack
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    HEALTH_ENV_KEYWORDS.iter().any(|k| has_word_sequence(&words, k))
}

/// True when `keyword`'s `_`-separated parts appear as consecutive words
fn has_word_sequence(words: &[&str], keyword: &str) -> bool {
    let parts: Vec<&str> = keyword.split('_').collect();
    words.windows(parts.len()).any(|w| w == parts.as_slice())
}

/// Default score for an entity; never fails and is deterministic
pub fn classify(entity: &EntitySnapshot, batch_number: u32) -> ScoreResult {
    let weight = domain_weight(&entity.domain);

    if entity.is_unavailable() {
        return ScoreResult::new(
            entity.entity_id.clone(),
            weight,
            format!(
                "Fallback: entity is {}, flagged for availability alerts",
                entity.state.to_lowercase()
            ),
            CategorySet::single(Category::Alerts),
            ManagementType::Service,
            Method::Fallback,
            batch_number,
        );
    }

    let mut categories = Vec::new();
    let mut management = None;
    let mut labels = Vec::new();

    for rule in ATTRIBUTE_RULES.iter().filter(|r| (r.matches)(entity)) {
        categories.extend_from_slice(rule.categories);
        management.get_or_insert(rule.management);
        labels.push(rule.label);
    }

    let rule = DOMAIN_RULES
        .iter()
        .find(|r| r.domains.contains(&entity.domain.as_str()))
        .unwrap_or(&DEFAULT_DOMAIN_RULE);
    categories.extend_from_slice(rule.categories);
    management.get_or_insert(rule.management);
    labels.push(rule.label);

    if matches!(entity.domain.as_str(), "sensor" | "binary_sensor")
        && is_health_or_environment(entity)
    {
        categories.push(Category::Alerts);
        labels.push("health or environmental value worth alerting on");
    }

    ScoreResult::new(
        entity.entity_id.clone(),
        weight,
        format!("Fallback: {} ({} domain)", labels.join("; "), entity.domain),
        categories.into_iter().collect(),
        management.unwrap_or_default(),
        Method::Fallback,
        batch_number,
    )
}
