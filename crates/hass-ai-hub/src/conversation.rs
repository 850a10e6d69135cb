//! Conversation agent backed by the `conversation.process` service

use std::sync::Arc;

use async_trait::async_trait;
use hass_ai_core::{
    AgentInfo, ConversationAgent, ConversationError, ConversationRequest, ServiceCallError,
};
use serde_json::{json, Value};
use tracing::debug;

use crate::ServiceRegistry;

/// Extract the plain speech from a `conversation.process` response
///
/// Accepts both the bare `{"response": ...}` body and the service response
/// wrapper. A `response_type` of `error` becomes [`ConversationError::Failed`]
/// carrying the speech, so callers can inspect the agent's error text.
pub fn speech_from_response(body: &Value) -> Result<String, ConversationError> {
    let response = body.get("response").unwrap_or(body);
    let speech = response
        .pointer("/speech/plain/speech")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            ConversationError::InvalidResponse("missing response.speech.plain.speech".to_string())
        })?;

    if response.get("response_type").and_then(Value::as_str) == Some("error") {
        return Err(ConversationError::Failed(speech.to_string()));
    }
    Ok(speech.to_string())
}

/// Routes prompts through the hub's service registry
pub struct ServiceConversationAgent {
    services: Arc<ServiceRegistry>,
    agents: Vec<AgentInfo>,
}

impl ServiceConversationAgent {
    pub fn new(services: Arc<ServiceRegistry>) -> Self {
        Self {
            services,
            agents: Vec::new(),
        }
    }

    /// Agents reported to "auto" selection
    pub fn with_agents(mut self, agents: Vec<AgentInfo>) -> Self {
        self.agents = agents;
        self
    }
}

#[async_trait]
impl ConversationAgent for ServiceConversationAgent {
    async fn process(&self, request: ConversationRequest) -> Result<String, ConversationError> {
        let mut data = json!({"text": request.text, "language": request.language.code()});
        if let Some(agent_id) = &request.agent_id {
            data["agent_id"] = json!(agent_id);
        }
        debug!(agent_id = ?request.agent_id, chars = request.text.len(), "conversation.process");

        let reply = self
            .services
            .call("conversation", "process", data)
            .await
            .map_err(|e| match e {
                ServiceCallError::NotFound { .. } => ConversationError::Unavailable(e.to_string()),
                other => ConversationError::Failed(other.to_string()),
            })?
            .ok_or_else(|| ConversationError::InvalidResponse("empty response".to_string()))?;

        speech_from_response(&reply)
    }

    async fn list_agents(&self) -> Vec<AgentInfo> {
        self.agents.clone()
    }
}
