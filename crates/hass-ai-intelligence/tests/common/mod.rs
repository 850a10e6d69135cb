//! Shared stubs for the intelligence integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hass_ai_core::{
    ConversationAgent, ConversationError, ConversationRequest, EntityId, EntitySnapshot,
    StateSource,
};
use hass_ai_intelligence::{BatchController, ConversationClient, PromptBuilder, ScanEvent};
use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;

type Reply = dyn Fn(&ConversationRequest, usize) -> Result<String, ConversationError> + Send + Sync;

/// Agent whose replies come from a closure; records every prompt
pub struct ScriptedAgent {
    reply: Box<Reply>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedAgent {
    pub fn new<F>(reply: F) -> Arc<Self>
    where
        F: Fn(&ConversationRequest, usize) -> Result<String, ConversationError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            reply: Box::new(reply),
            prompts: Mutex::new(Vec::new()),
        })
    }

    /// Rates every entity of the prompt 3
    pub fn well_formed() -> Arc<Self> {
        Self::new(|request, _| Ok(rate_all(&request.text, 3)))
    }

    pub fn unreachable() -> Arc<Self> {
        Self::new(|_, _| Err(ConversationError::Unavailable("connection refused".into())))
    }

    pub fn always_token_limit() -> Arc<Self> {
        Self::new(|_, _| Ok("Error: token limit exceeded".into()))
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompt(&self, n: usize) -> String {
        self.prompts.lock().unwrap()[n].clone()
    }
}

#[async_trait]
impl ConversationAgent for ScriptedAgent {
    async fn process(&self, request: ConversationRequest) -> Result<String, ConversationError> {
        let call = {
            let mut prompts = self.prompts.lock().unwrap();
            prompts.push(request.text.clone());
            prompts.len() - 1
        };
        (self.reply)(&request, call)
    }
}

/// Entity ids listed in a rendered prompt, in order
pub fn prompt_entities(prompt: &str) -> Vec<String> {
    prompt
        .lines()
        .filter_map(|line| {
            let (id, rest) = line.split_once(' ')?;
            (rest.starts_with('(') && id.parse::<EntityId>().is_ok()).then(|| id.to_string())
        })
        .collect()
}

/// JSON reply rating every entity of `prompt` with `rating`
pub fn rate_all(prompt: &str, rating: u8) -> String {
    let items: Vec<_> = prompt_entities(prompt)
        .into_iter()
        .map(|id| json!({"entity_id": id, "rating": rating, "reason": "scored by stub", "category": "DATA"}))
        .collect();
    serde_json::to_string(&items).unwrap()
}

pub fn entity(id: &str, state: &str) -> EntitySnapshot {
    EntitySnapshot::new(id.parse().unwrap(), state, HashMap::new())
}

pub fn lights(count: usize) -> Vec<EntitySnapshot> {
    (0..count)
        .map(|n| entity(&format!("light.lamp_{n:02}"), "on"))
        .collect()
}

pub fn client(agent: Arc<dyn ConversationAgent>) -> Arc<ConversationClient> {
    Arc::new(ConversationClient::new(agent).with_pacing(Duration::ZERO, Duration::ZERO))
}

pub fn controller(agent: Arc<dyn ConversationAgent>, batch_size: usize) -> BatchController {
    BatchController::new(
        Arc::new(PromptBuilder::new().unwrap()),
        client(agent),
        hass_ai_core::Language::En,
        batch_size,
    )
}

pub fn drain(rx: &mut UnboundedReceiver<ScanEvent>) -> Vec<ScanEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Fixed set of states
pub struct StaticStates(pub Vec<EntitySnapshot>);

#[async_trait]
impl StateSource for StaticStates {
    async fn all_states(&self) -> Vec<EntitySnapshot> {
        self.0.clone()
    }

    async fn get_state(&self, entity_id: &str) -> Option<EntitySnapshot> {
        self.0
            .iter()
            .find(|e| e.entity_id.as_str() == entity_id)
            .cloned()
    }
}
