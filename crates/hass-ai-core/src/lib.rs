//! Core types for HASS AI
//!
//! This crate provides the types shared by every other HASS AI crate:
//! EntityId, EntitySnapshot, ScoreResult and its category/management enums,
//! plus the host seams (conversation agent, state source, service caller)
//! that the intelligence and alert layers are written against.

mod cancel;
mod entity_id;
mod host;
mod language;
mod score;
mod snapshot;

pub use cancel::CancelToken;
pub use entity_id::{EntityId, EntityIdError};
pub use host::{
    AgentInfo, ConversationAgent, ConversationError, ConversationRequest, ServiceCallError,
    ServiceCaller, StateSource,
};
pub use language::Language;
pub use score::{Category, CategorySet, ManagementType, Method, ScoreResult};
pub use snapshot::EntitySnapshot;

/// Integration domain
pub const DOMAIN: &str = "hass_ai";

/// Provider name of the local conversation agent
pub const AI_PROVIDER_LOCAL: &str = "Local Agent";

/// Default number of entities per prompt
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default rescan interval in days
pub const DEFAULT_SCAN_INTERVAL_DAYS: u32 = 7;

/// Highest importance weight an entity can carry
pub const MAX_WEIGHT: u8 = 5;

/// States that mark an entity as not reporting
pub const UNAVAILABLE_STATES: [&str; 3] = ["unavailable", "unknown", "error"];
