//! Read-only view of an entity's state as seen at scan time

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{EntityId, UNAVAILABLE_STATES};

/// Snapshot of one entity: identity, state and attributes
///
/// Deserializes from both its own serialized form and a Home Assistant
/// state object (`{"entity_id", "state", "attributes": {...}}`); `domain`
/// and `friendly_name` are derived when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "SnapshotRepr")]
pub struct EntitySnapshot {
    pub entity_id: EntityId,
    pub domain: String,
    pub state: String,
    pub friendly_name: String,
    #[serde(default)]
    pub attributes: HashMap<String, Value>,
}

#[derive(Deserialize)]
struct SnapshotRepr {
    entity_id: EntityId,
    #[serde(default)]
    domain: Option<String>,
    #[serde(default)]
    state: String,
    #[serde(default)]
    friendly_name: Option<String>,
    #[serde(default)]
    attributes: HashMap<String, Value>,
}

impl From<SnapshotRepr> for EntitySnapshot {
    fn from(repr: SnapshotRepr) -> Self {
        let mut snapshot = EntitySnapshot::new(repr.entity_id, repr.state, repr.attributes);
        if let Some(domain) = repr.domain {
            snapshot.domain = domain;
        }
        if let Some(name) = repr.friendly_name {
            snapshot.friendly_name = name;
        }
        snapshot
    }
}

impl EntitySnapshot {
    pub fn new(
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: HashMap<String, Value>,
    ) -> Self {
        let friendly_name = attributes
            .get("friendly_name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| entity_id.to_string());
        Self {
            domain: entity_id.domain().to_string(),
            entity_id,
            state: state.into(),
            friendly_name,
            attributes,
        }
    }

    /// Attach a single attribute, builder style
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        let value = value.into();
        if key == "friendly_name" {
            if let Some(name) = value.as_str() {
                self.friendly_name = name.to_string();
            }
        }
        self.attributes.insert(key, value);
        self
    }

    /// True for `unavailable`, `unknown` and `error` states
    pub fn is_unavailable(&self) -> bool {
        let state = self.state.to_ascii_lowercase();
        UNAVAILABLE_STATES.contains(&state.as_str())
    }

    /// The state parsed as a float, if it is numeric
    pub fn numeric_state(&self) -> Option<f64> {
        self.state.trim().parse::<f64>().ok().filter(|v| v.is_finite())
    }

    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    pub fn device_class(&self) -> Option<&str> {
        self.attribute_str("device_class")
    }

    pub fn unit(&self) -> Option<&str> {
        self.attribute_str("unit_of_measurement")
    }
}
