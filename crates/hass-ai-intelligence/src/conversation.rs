//! Paced, single-flight access to the conversation agent

use std::sync::Arc;
use std::time::Duration;

use hass_ai_config::AUTO_AGENT;
use hass_ai_core::{ConversationAgent, ConversationError, ConversationRequest, Language};
use rand::Rng;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, instrument};

/// Default bounds of the random delay before each call
pub const DEFAULT_PACING: (Duration, Duration) =
    (Duration::from_millis(1500), Duration::from_millis(2500));

/// Wraps a [`ConversationAgent`] with agent selection, pacing and timeout
pub struct ConversationClient {
    agent: Arc<dyn ConversationAgent>,
    configured_agent: Option<String>,
    resolved_agent: OnceCell<Option<String>>,
    pacing: (Duration, Duration),
    timeout: Option<Duration>,
    in_flight: Mutex<()>,
}

impl ConversationClient {
    pub fn new(agent: Arc<dyn ConversationAgent>) -> Self {
        Self {
            agent,
            configured_agent: None,
            resolved_agent: OnceCell::new(),
            pacing: DEFAULT_PACING,
            timeout: None,
            in_flight: Mutex::new(()),
        }
    }

    /// Agent id from the config entry: an id, `"auto"`, or `None` for the default
    pub fn with_agent(mut self, agent_id: Option<String>) -> Self {
        self.configured_agent = agent_id.filter(|a| !a.trim().is_empty());
        self
    }

    pub fn with_pacing(mut self, min: Duration, max: Duration) -> Self {
        self.pacing = (min.min(max), max.max(min));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Agent to address; `None` means the host's default agent
    ///
    /// `"auto"` picks the first agent that is not the default one. Never
    /// fails: an unknown or empty agent list falls back to the default.
    pub async fn resolve_agent(&self) -> Option<String> {
        self.resolved_agent
            .get_or_init(|| async {
                match self.configured_agent.as_deref() {
                    None => None,
                    Some(AUTO_AGENT) => {
                        let picked = self
                            .agent
                            .list_agents()
                            .await
                            .into_iter()
                            .find(|a| !a.is_default)
                            .map(|a| a.id);
                        info!(agent = ?picked, "auto-selected conversation agent");
                        picked
                    }
                    Some(explicit) => Some(explicit.to_string()),
                }
            })
            .await
            .clone()
    }

    async fn pace(&self) {
        let (min, max) = self.pacing;
        if max.is_zero() {
            return;
        }
        let delay = {
            let mut rng = rand::thread_rng();
            Duration::from_millis(rng.gen_range(min.as_millis() as u64..=max.as_millis() as u64))
        };
        debug!(delay_ms = delay.as_millis() as u64, "pacing before agent call");
        tokio::time::sleep(delay).await;
    }

    /// Send one prompt and return the agent's plain-text reply
    #[instrument(skip(self, prompt), fields(chars = prompt.len()))]
    pub async fn query(&self, prompt: &str, language: Language) -> Result<String, ConversationError> {
        let _guard = self.in_flight.lock().await;
        self.pace().await;

        let request = ConversationRequest {
            text: prompt.to_string(),
            language,
            agent_id: self.resolve_agent().await,
        };

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.agent.process(request))
                .await
                .map_err(|_| ConversationError::Timeout(limit))?,
            None => self.agent.process(request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hass_ai_core::AgentInfo;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct Recorder {
        agents: Vec<AgentInfo>,
        seen: StdMutex<Vec<Option<String>>>,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl ConversationAgent for Recorder {
        async fn process(&self, request: ConversationRequest) -> Result<String, ConversationError> {
            self.seen.lock().unwrap().push(request.agent_id);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok("[]".to_string())
        }

        async fn list_agents(&self) -> Vec<AgentInfo> {
            self.agents.clone()
        }
    }

    fn agents() -> Vec<AgentInfo> {
        vec![
            AgentInfo {
                id: "conversation.home_assistant".into(),
                name: "Home Assistant".into(),
                is_default: true,
            },
            AgentInfo {
                id: "conversation.openai".into(),
                name: "OpenAI".into(),
                is_default: false,
            },
        ]
    }

    fn client(agent: Arc<Recorder>, configured: Option<&str>) -> ConversationClient {
        ConversationClient::new(agent)
            .with_agent(configured.map(str::to_string))
            .with_pacing(Duration::ZERO, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_agent_resolution() {
        let recorder = Arc::new(Recorder {
            agents: agents(),
            ..Default::default()
        });

        assert_eq!(client(recorder.clone(), None).resolve_agent().await, None);
        assert_eq!(
            client(recorder.clone(), Some("conversation.x")).resolve_agent().await,
            Some("conversation.x".to_string())
        );
        assert_eq!(
            client(recorder.clone(), Some("auto")).resolve_agent().await,
            Some("conversation.openai".to_string())
        );

        let no_agents = Arc::new(Recorder::default());
        assert_eq!(client(no_agents, Some("auto")).resolve_agent().await, None);
    }

    #[tokio::test]
    async fn test_query_passes_resolved_agent() {
        let recorder = Arc::new(Recorder {
            agents: agents(),
            ..Default::default()
        });
        let client = client(recorder.clone(), Some("auto"));
        assert_eq!(client.query("rate", Language::En).await.unwrap(), "[]");
        assert_eq!(
            recorder.seen.lock().unwrap().as_slice(),
            &[Some("conversation.openai".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_delay_bounds() {
        let recorder = Arc::new(Recorder::default());
        let client = ConversationClient::new(recorder);
        let start = tokio::time::Instant::now();
        client.query("x", Language::En).await.unwrap();
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(1500), "{waited:?}");
        assert!(waited <= Duration::from_millis(2600), "{waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let recorder = Arc::new(Recorder {
            delay: Some(Duration::from_secs(60)),
            ..Default::default()
        });
        let client = client(recorder, None).with_timeout(Duration::from_secs(30));
        assert_eq!(
            client.query("x", Language::En).await,
            Err(ConversationError::Timeout(Duration::from_secs(30)))
        );
    }
}
