//! Home Assistant host seams for HASS AI
//!
//! The service runs next to Home Assistant rather than inside it. This crate
//! holds everything the integration would otherwise take from the host:
//!
//! - [`StateStore`]: current entity snapshots with a domain index
//! - [`ServiceRegistry`]: async service handlers (`notify.*`, `conversation.process`, ...)
//! - [`EventBus`]: broadcast pub/sub for integration signals
//! - [`ServiceConversationAgent`]: a conversation agent backed by the registry
//! - [`RestClient`]: the same seams against a real Home Assistant over REST

mod conversation;
mod event_bus;
mod rest;
mod services;
mod state_store;

use std::sync::Arc;

pub use conversation::{speech_from_response, ServiceConversationAgent};
pub use event_bus::{EventBus, HubEvent};
pub use rest::{spawn_state_sync, RestClient, RestError};
pub use services::{ServiceCall, ServiceFuture, ServiceHandler, ServiceRegistry, ServiceResult};
pub use state_store::StateStore;

/// Event fired whenever a stored snapshot changes
pub const EVENT_STATE_CHANGED: &str = "state_changed";

/// Shared handles to the in-process host
#[derive(Clone)]
pub struct Hub {
    pub bus: Arc<EventBus>,
    pub states: Arc<StateStore>,
    pub services: Arc<ServiceRegistry>,
}

impl Hub {
    pub fn new() -> Self {
        let bus = Arc::new(EventBus::new());
        Self {
            states: Arc::new(StateStore::new(bus.clone())),
            services: Arc::new(ServiceRegistry::new()),
            bus,
        }
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}
