//! Registry of running scans, so a client can stop them

use dashmap::DashMap;
use hass_ai_core::CancelToken;
use tracing::{debug, info};
use ulid::Ulid;

#[derive(Default)]
pub struct Operations {
    running: DashMap<String, CancelToken>,
}

impl Operations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new operation and hand back its id and stop flag
    pub fn start(&self) -> (String, CancelToken) {
        let id = Ulid::new().to_string();
        let token = CancelToken::new();
        self.running.insert(id.clone(), token.clone());
        debug!(operation_id = %id, "operation started");
        (id, token)
    }

    pub fn finish(&self, id: &str) {
        if self.running.remove(id).is_some() {
            debug!(operation_id = id, "operation finished");
        }
    }

    /// Stop one operation; false when the id is unknown or already done
    pub fn cancel(&self, id: &str) -> bool {
        match self.running.remove(id) {
            Some((_, token)) => {
                token.cancel();
                info!(operation_id = id, "operation stopped");
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) -> usize {
        let ids: Vec<String> = self.running.iter().map(|e| e.key().clone()).collect();
        ids.iter().filter(|id| self.cancel(id)).count()
    }

    pub fn len(&self) -> usize {
        self.running.len()
    }

    pub fn is_empty(&self) -> bool {
        self.running.is_empty()
    }
}
