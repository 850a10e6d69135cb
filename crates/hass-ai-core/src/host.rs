//! Seams to the Home Assistant host
//!
//! The intelligence and alert layers only talk to Home Assistant through
//! these traits. `hass-ai-hub` provides in-process and REST implementations.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{EntitySnapshot, Language};

/// Failure while talking to a conversation agent
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConversationError {
    #[error("conversation agent unavailable: {0}")]
    Unavailable(String),

    #[error("conversation agent timed out after {0:?}")]
    Timeout(Duration),

    #[error("conversation agent failed: {0}")]
    Failed(String),

    #[error("conversation agent returned an unexpected payload: {0}")]
    InvalidResponse(String),
}

/// One request to `conversation.process`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRequest {
    pub text: String,
    pub language: Language,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
}

/// A conversation agent known to the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub is_default: bool,
}

/// LLM-backed conversation agent
#[async_trait]
pub trait ConversationAgent: Send + Sync {
    /// Send one prompt and return the plain speech text of the reply
    async fn process(&self, request: ConversationRequest) -> Result<String, ConversationError>;

    /// Agents available for selection; the host's default agent is flagged
    async fn list_agents(&self) -> Vec<AgentInfo> {
        Vec::new()
    }
}

/// Read access to current entity states
#[async_trait]
pub trait StateSource: Send + Sync {
    async fn all_states(&self) -> Vec<EntitySnapshot>;

    async fn get_state(&self, entity_id: &str) -> Option<EntitySnapshot>;
}

/// Failure of a host service call
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ServiceCallError {
    #[error("service not found: {domain}.{service}")]
    NotFound { domain: String, service: String },

    #[error("service call failed: {0}")]
    Failed(String),

    #[error("invalid service data: {0}")]
    InvalidData(String),
}

/// Invokes host services such as `notify.notify` or `input_text.set_value`
#[async_trait]
pub trait ServiceCaller: Send + Sync {
    async fn call_service(
        &self,
        domain: &str,
        service: &str,
        data: Value,
    ) -> Result<Option<Value>, ServiceCallError>;
}
