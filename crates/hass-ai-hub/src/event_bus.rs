//! Broadcast event bus

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, trace};

const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// An event as delivered to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubEvent {
    pub event_type: String,
    pub data: Value,
    pub time_fired: DateTime<Utc>,
}

/// Pub/sub keyed by event type, plus a catch-all channel
pub struct EventBus {
    channels: DashMap<String, broadcast::Sender<HubEvent>>,
    all: broadcast::Sender<HubEvent>,
    capacity: usize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (all, _) = broadcast::channel(capacity);
        Self {
            channels: DashMap::new(),
            all,
            capacity,
        }
    }

    pub fn subscribe(&self, event_type: &str) -> broadcast::Receiver<HubEvent> {
        trace!(event_type, "subscribing");
        self.channels
            .entry(event_type.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    pub fn subscribe_all(&self) -> broadcast::Receiver<HubEvent> {
        self.all.subscribe()
    }

    /// Deliver to subscribers of `event_type` and to catch-all subscribers
    pub fn fire(&self, event_type: &str, data: Value) {
        debug!(event_type, "firing event");
        let event = HubEvent {
            event_type: event_type.to_string(),
            data,
            time_fired: Utc::now(),
        };
        if let Some(tx) = self.channels.get(event_type) {
            // No receivers is fine
            let _ = tx.send(event.clone());
        }
        let _ = self.all.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
