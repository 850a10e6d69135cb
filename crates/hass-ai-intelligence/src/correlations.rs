//! Related-entity discovery for a single entity
//!
//! The agent gets the target entity and a shortlist of candidates ranked by
//! shared name tokens, and answers with a JSON array of
//! `{entity_id, correlation_type, strength, reason}`. Results are stored per
//! target under `hass_ai_correlations`.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use hass_ai_core::{EntitySnapshot, Language};
use hass_ai_storage::{Storable, Storage, KEY_CORRELATIONS, STORAGE_VERSION};
use minijinja::{context, Environment};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::conversation::ConversationClient;
use crate::error::{ParseFailure, PromptError};
use crate::parser::{mentions_token_limit, strip_fences};

/// Candidates offered to the agent per request
pub const MAX_CANDIDATES: usize = 25;

const CORRELATION_EN: &str = r#"You are a Home Assistant expert. Find entities that are functionally related to {{ target.id }} ({{ target.domain }}, {{ target.state }}, {{ target.name }}).
Consider entities that measure the same room or device, control it, or are typically used together in automations.

Candidates:
{% for e in candidates %}{{ e.id }} ({{ e.domain }}, {{ e.state }}, {{ e.name }})
{% endfor %}
Respond ONLY with a JSON array, at most 10 items, strength from 1 (weak) to 5 (strong):
[{"entity_id": "...", "correlation_type": "same_device|same_area|control|automation", "strength": 1-5, "reason": "one short sentence in English"}]"#;

const CORRELATION_IT: &str = r#"Sei un esperto di Home Assistant. Trova le entità funzionalmente collegate a {{ target.id }} ({{ target.domain }}, {{ target.state }}, {{ target.name }}).
Considera entità che misurano la stessa stanza o dispositivo, lo comandano o sono usate insieme nelle automazioni.

Candidati:
{% for e in candidates %}{{ e.id }} ({{ e.domain }}, {{ e.state }}, {{ e.name }})
{% endfor %}
Rispondi SOLO con un array JSON, al massimo 10 elementi, strength da 1 (debole) a 5 (forte):
[{"entity_id": "...", "correlation_type": "same_device|same_area|control|automation", "strength": 1-5, "reason": "una frase breve in italiano"}]"#;

#[derive(Debug, Error)]
pub enum CorrelationError {
    #[error("entity {0} not found")]
    EntityNotFound(String),

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error(transparent)]
    Agent(#[from] hass_ai_core::ConversationError),

    #[error("could not parse correlations: {0}")]
    Parse(#[from] ParseFailure),

    #[error(transparent)]
    Storage(#[from] hass_ai_storage::StorageError),
}

/// One entity related to the target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    pub entity_id: String,
    pub correlation_type: String,
    pub strength: u8,
    pub reason: String,
}

/// Correlations found so far, keyed by target entity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrelationsData {
    #[serde(default)]
    pub correlations: BTreeMap<String, Vec<Correlation>>,
    #[serde(default)]
    pub updated: BTreeMap<String, DateTime<Utc>>,
}

impl Storable for CorrelationsData {
    const KEY: &'static str = KEY_CORRELATIONS;
    const VERSION: u32 = STORAGE_VERSION;
}

#[derive(Serialize)]
struct Row<'a> {
    id: &'a str,
    domain: &'a str,
    state: &'a str,
    name: &'a str,
}

impl<'a> From<&'a EntitySnapshot> for Row<'a> {
    fn from(e: &'a EntitySnapshot) -> Self {
        Row {
            id: e.entity_id.as_str(),
            domain: &e.domain,
            state: &e.state,
            name: &e.friendly_name,
        }
    }
}

pub struct CorrelationFinder {
    env: Environment<'static>,
    client: Arc<ConversationClient>,
    storage: Arc<Storage>,
}

impl CorrelationFinder {
    /// `client` should carry the correlation timeout
    pub fn new(client: Arc<ConversationClient>, storage: Arc<Storage>) -> Result<Self, PromptError> {
        let mut env = Environment::new();
        for (name, source) in [("correlation_en", CORRELATION_EN), ("correlation_it", CORRELATION_IT)] {
            env.add_template(name, source)
                .map_err(|e| PromptError::Compile {
                    name: name.to_string(),
                    message: e.to_string(),
                })?;
        }
        Ok(Self {
            env,
            client,
            storage,
        })
    }

    fn render(
        &self,
        target: &EntitySnapshot,
        candidates: &[&EntitySnapshot],
        language: Language,
    ) -> Result<String, PromptError> {
        let name = match language {
            Language::En => "correlation_en",
            Language::It => "correlation_it",
        };
        let rows: Vec<Row<'_>> = candidates.iter().map(|e| Row::from(*e)).collect();
        self.env
            .get_template(name)
            .and_then(|t| t.render(context! { target => Row::from(target), candidates => rows }))
            .map_err(|e| PromptError::render(name, e))
    }

    /// Ask the agent which of `states` relate to `entity_id` and persist the answer
    #[instrument(skip(self, states), fields(candidates = tracing::field::Empty))]
    pub async fn find(
        &self,
        entity_id: &str,
        states: &[EntitySnapshot],
        language: Language,
    ) -> Result<Vec<Correlation>, CorrelationError> {
        let target = states
            .iter()
            .find(|e| e.entity_id.as_str() == entity_id)
            .ok_or_else(|| CorrelationError::EntityNotFound(entity_id.to_string()))?;
        let candidates = candidates(target, states);
        tracing::Span::current().record("candidates", candidates.len());

        let prompt = self.render(target, &candidates, language)?;
        let raw = self.client.query(&prompt, language).await?;
        let allowed: HashSet<&str> = candidates.iter().map(|e| e.entity_id.as_str()).collect();
        let found = parse_correlations(&raw, &allowed)?;

        let mut data: CorrelationsData = self.storage.load().await?;
        data.correlations.insert(entity_id.to_string(), found.clone());
        data.updated.insert(entity_id.to_string(), Utc::now());
        self.storage.save(&data).await?;

        info!(entity_id, count = found.len(), "stored correlations");
        Ok(found)
    }

    /// Previously stored correlations for `entity_id`
    pub async fn stored(&self, entity_id: &str) -> Result<Vec<Correlation>, CorrelationError> {
        let data: CorrelationsData = self.storage.load().await?;
        Ok(data.correlations.get(entity_id).cloned().unwrap_or_default())
    }
}

fn name_tokens(entity: &EntitySnapshot) -> HashSet<String> {
    entity
        .entity_id
        .object_id()
        .split('_')
        .chain(entity.friendly_name.split_whitespace())
        .map(str::to_lowercase)
        .filter(|t| t.chars().count() >= 3)
        .collect()
}

/// Other entities ranked by shared name tokens, then same domain
pub fn candidates<'a>(target: &EntitySnapshot, states: &'a [EntitySnapshot]) -> Vec<&'a EntitySnapshot> {
    let tokens = name_tokens(target);
    let mut ranked: Vec<(usize, bool, &EntitySnapshot)> = states
        .iter()
        .filter(|e| e.entity_id != target.entity_id)
        .map(|e| {
            let shared = name_tokens(e).intersection(&tokens).count();
            (shared, e.domain == target.domain, e)
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.0.cmp(&a.0)
            .then(b.1.cmp(&a.1))
            .then_with(|| a.2.entity_id.cmp(&b.2.entity_id))
    });
    ranked
        .into_iter()
        .take(MAX_CANDIDATES)
        .map(|(_, _, e)| e)
        .collect()
}

fn parse_correlations(raw: &str, allowed: &HashSet<&str>) -> Result<Vec<Correlation>, ParseFailure> {
    if mentions_token_limit(raw) {
        return Err(ParseFailure::TokenLimit);
    }
    let value: Value = serde_json::from_str(strip_fences(raw))
        .map_err(|e| ParseFailure::InvalidJson(e.to_string()))?;
    let Value::Array(items) = value else {
        return Err(ParseFailure::NotAnArray);
    };

    let mut seen = HashSet::new();
    let mut found = Vec::new();
    for item in items {
        let Some(entity_id) = item.get("entity_id").and_then(Value::as_str) else {
            continue;
        };
        if !allowed.contains(entity_id) || !seen.insert(entity_id.to_string()) {
            debug!(entity_id, "skipping correlation");
            continue;
        }
        let strength = item
            .get("strength")
            .and_then(Value::as_u64)
            .map(|s| s.clamp(1, 5) as u8)
            .unwrap_or(1);
        found.push(Correlation {
            entity_id: entity_id.to_string(),
            correlation_type: item
                .get("correlation_type")
                .and_then(Value::as_str)
                .unwrap_or("related")
                .to_string(),
            strength,
            reason: item
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim()
                .to_string(),
        });
    }
    if found.is_empty() && !allowed.is_empty() {
        warn!("agent reported no usable correlations");
    }
    found.sort_by(|a, b| b.strength.cmp(&a.strength));
    Ok(found)
}
