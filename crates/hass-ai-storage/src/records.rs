//! Record types persisted by the integration

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use hass_ai_core::ScoreResult;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Storable;

pub const KEY_INTELLIGENCE_DATA: &str = "hass_ai_intelligence_data";
pub const KEY_AI_RESULTS: &str = "hass_ai_ai_results";
pub const KEY_CORRELATIONS: &str = "hass_ai_correlations";
pub const KEY_ALERT_CONFIG: &str = "hass_ai_alert_config";

/// Schema version shared by every record
pub const STORAGE_VERSION: u32 = 1;

/// A user's manual adjustment of one entity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_weight: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Fields the panel stores that the service does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// User overrides and scan bookkeeping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntelligenceData {
    #[serde(default)]
    pub overrides: BTreeMap<String, EntityOverride>,
    #[serde(default)]
    pub last_scan: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_scan_entity_count: usize,
}

impl IntelligenceData {
    /// Effective weight of an entity after applying any override
    pub fn effective_weight(&self, result: &ScoreResult) -> u8 {
        self.overrides
            .get(result.entity_id.as_str())
            .and_then(|o| o.overall_weight)
            .map(|w| w.min(hass_ai_core::MAX_WEIGHT))
            .unwrap_or(result.weight)
    }

    /// Entities are enabled unless explicitly switched off
    pub fn is_enabled(&self, entity_id: &str) -> bool {
        self.overrides
            .get(entity_id)
            .and_then(|o| o.enabled)
            .unwrap_or(true)
    }
}

impl Storable for IntelligenceData {
    const KEY: &'static str = KEY_INTELLIGENCE_DATA;
    const VERSION: u32 = STORAGE_VERSION;
}

/// Results of the last scan, keyed by entity id in scan order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiResultsData {
    #[serde(default)]
    pub results: IndexMap<String, ScoreResult>,
    #[serde(default)]
    pub last_scan_timestamp: Option<String>,
    #[serde(default)]
    pub total_entities: usize,
}

impl AiResultsData {
    pub fn from_results(results: &[ScoreResult], timestamp: DateTime<Utc>) -> Self {
        let results: IndexMap<String, ScoreResult> = results
            .iter()
            .map(|r| (r.entity_id.to_string(), r.clone()))
            .collect();
        Self {
            total_entities: results.len(),
            results,
            last_scan_timestamp: Some(timestamp.to_rfc3339()),
        }
    }
}

impl Storable for AiResultsData {
    const KEY: &'static str = KEY_AI_RESULTS;
    const VERSION: u32 = STORAGE_VERSION;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Storage;
    use hass_ai_core::{Category, CategorySet, ManagementType, Method};
    use serde_json::json;
    use tempfile::TempDir;

    fn result(id: &str, weight: u8) -> ScoreResult {
        ScoreResult::new(
            id.parse().unwrap(),
            weight,
            "test",
            CategorySet::single(Category::Data),
            ManagementType::User,
            Method::Ai,
            1,
        )
    }

    #[test]
    fn test_override_keeps_unknown_fields() {
        let overrides: BTreeMap<String, EntityOverride> = serde_json::from_value(json!({
            "light.kitchen": {"overall_weight": 4, "enabled": false, "note": "mine"}
        }))
        .unwrap();
        let o = &overrides["light.kitchen"];
        assert_eq!(o.overall_weight, Some(4));
        assert_eq!(o.enabled, Some(false));
        assert_eq!(o.extra["note"], "mine");
    }

    #[test]
    fn test_effective_weight_and_enabled() {
        let mut data = IntelligenceData::default();
        data.overrides.insert(
            "light.kitchen".into(),
            EntityOverride {
                overall_weight: Some(1),
                enabled: Some(false),
                ..Default::default()
            },
        );
        assert_eq!(data.effective_weight(&result("light.kitchen", 4)), 1);
        assert_eq!(data.effective_weight(&result("light.hall", 4)), 4);
        assert!(!data.is_enabled("light.kitchen"));
        assert!(data.is_enabled("light.hall"));
    }

    #[tokio::test]
    async fn test_ai_results_persist_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path());
        let results = vec![result("sensor.b", 2), result("sensor.a", 3)];

        let data = AiResultsData::from_results(&results, Utc::now());
        storage.save(&data).await.unwrap();

        let loaded: AiResultsData = storage.load().await.unwrap();
        assert_eq!(loaded.total_entities, 2);
        assert_eq!(
            loaded.results.keys().collect::<Vec<_>>(),
            vec!["sensor.b", "sensor.a"]
        );
        assert!(loaded.last_scan_timestamp.is_some());
    }
}
