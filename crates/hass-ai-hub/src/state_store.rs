//! In-memory entity snapshots with a domain index

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use hass_ai_core::{EntitySnapshot, StateSource};
use serde_json::json;
use tracing::{debug, instrument};

use crate::{EventBus, EVENT_STATE_CHANGED};

/// Current state of every known entity
///
/// Fires `state_changed` on the bus whenever a snapshot is added, changed
/// or removed.
pub struct StateStore {
    states: DashMap<String, EntitySnapshot>,
    domain_index: DashMap<String, Vec<String>>,
    bus: Arc<EventBus>,
}

impl StateStore {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            states: DashMap::new(),
            domain_index: DashMap::new(),
            bus,
        }
    }

    /// Insert or replace a snapshot
    #[instrument(skip(self, snapshot), fields(entity_id = %snapshot.entity_id))]
    pub fn set(&self, snapshot: EntitySnapshot) {
        let key = snapshot.entity_id.to_string();
        let old = self.states.insert(key.clone(), snapshot.clone());

        if old.as_ref() == Some(&snapshot) {
            return;
        }
        if old.is_none() {
            self.domain_index
                .entry(snapshot.domain.clone())
                .or_default()
                .push(key);
        }

        debug!(state = %snapshot.state, "state set");
        self.bus.fire(
            EVENT_STATE_CHANGED,
            json!({"entity_id": snapshot.entity_id, "old_state": old, "new_state": snapshot}),
        );
    }

    pub fn remove(&self, entity_id: &str) -> Option<EntitySnapshot> {
        let (_, old) = self.states.remove(entity_id)?;
        if let Some(mut ids) = self.domain_index.get_mut(&old.domain) {
            ids.retain(|id| id != entity_id);
        }
        self.bus.fire(
            EVENT_STATE_CHANGED,
            json!({"entity_id": entity_id, "old_state": old, "new_state": null}),
        );
        Some(old)
    }

    /// Make the store mirror `snapshots`, dropping entities not present
    pub fn replace_all(&self, snapshots: Vec<EntitySnapshot>) {
        let keep: HashSet<String> = snapshots.iter().map(|s| s.entity_id.to_string()).collect();
        let stale: Vec<String> = self
            .states
            .iter()
            .filter(|r| !keep.contains(r.key()))
            .map(|r| r.key().clone())
            .collect();
        for id in stale {
            self.remove(&id);
        }
        for snapshot in snapshots {
            self.set(snapshot);
        }
    }

    pub fn get(&self, entity_id: &str) -> Option<EntitySnapshot> {
        self.states.get(entity_id).map(|s| s.clone())
    }

    /// All snapshots sorted by entity id
    pub fn all(&self) -> Vec<EntitySnapshot> {
        let mut all: Vec<EntitySnapshot> = self.states.iter().map(|r| r.value().clone()).collect();
        all.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        all
    }

    pub fn domain_states(&self, domain: &str) -> Vec<EntitySnapshot> {
        self.domain_index
            .get(domain)
            .map(|ids| ids.iter().filter_map(|id| self.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[async_trait]
impl StateSource for StateStore {
    async fn all_states(&self) -> Vec<EntitySnapshot> {
        self.all()
    }

    async fn get_state(&self, entity_id: &str) -> Option<EntitySnapshot> {
        self.get(entity_id)
    }
}
