//! Home Assistant REST API client
//!
//! Provides the host seams against a running Home Assistant:
//! `GET /api/states`, `POST /api/services/<domain>/<service>` and
//! `POST /api/conversation/process`, authenticated with a long-lived token.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hass_ai_core::{
    ConversationAgent, ConversationError, ConversationRequest, EntitySnapshot, ServiceCallError,
    ServiceCaller,
};
use reqwest::StatusCode;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{speech_from_response, StateStore};

#[derive(Debug, Error)]
pub enum RestError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Home Assistant returned {status}: {body}")]
    Status { status: StatusCode, body: String },
}

/// Authenticated client for one Home Assistant instance
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl RestClient {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RestError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, RestError> {
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn decode(response: reqwest::Response) -> Result<Value, RestError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RestError::Status { status, body });
        }
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }

    /// Fetch every entity state; malformed entries are skipped
    pub async fn fetch_states(&self) -> Result<Vec<EntitySnapshot>, RestError> {
        let response = self
            .http
            .get(self.url("/api/states"))
            .bearer_auth(&self.token)
            .send()
            .await?;
        let body = Self::decode(response).await?;

        let snapshots = body
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| match serde_json::from_value(item.clone()) {
                        Ok(snapshot) => Some(snapshot),
                        Err(e) => {
                            warn!(error = %e, entity = %item["entity_id"], "skipping state");
                            None
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(snapshots)
    }

    /// Mirror the remote states into `store`
    pub async fn sync_into(&self, store: &StateStore) -> Result<usize, RestError> {
        let snapshots = self.fetch_states().await?;
        let count = snapshots.len();
        store.replace_all(snapshots);
        debug!(count, "synced states");
        Ok(count)
    }
}

#[async_trait]
impl ServiceCaller for RestClient {
    async fn call_service(
        &self,
        domain: &str,
        service: &str,
        data: Value,
    ) -> Result<Option<Value>, ServiceCallError> {
        match self.post(&format!("/api/services/{domain}/{service}"), &data).await {
            Ok(Value::Null) => Ok(None),
            Ok(body) => Ok(Some(body)),
            Err(RestError::Status { status, .. }) if status == StatusCode::NOT_FOUND => {
                Err(ServiceCallError::NotFound {
                    domain: domain.to_string(),
                    service: service.to_string(),
                })
            }
            Err(RestError::Status { status, body }) if status == StatusCode::BAD_REQUEST => {
                Err(ServiceCallError::InvalidData(body))
            }
            Err(e) => Err(ServiceCallError::Failed(e.to_string())),
        }
    }
}

#[async_trait]
impl ConversationAgent for RestClient {
    async fn process(&self, request: ConversationRequest) -> Result<String, ConversationError> {
        let mut body = json!({"text": request.text, "language": request.language.code()});
        if let Some(agent_id) = &request.agent_id {
            body["agent_id"] = json!(agent_id);
        }

        let reply = self
            .post("/api/conversation/process", &body)
            .await
            .map_err(|e| match e {
                RestError::Http(e) if e.is_timeout() => {
                    ConversationError::Failed(format!("request timed out: {e}"))
                }
                RestError::Http(e) if e.is_connect() => ConversationError::Unavailable(e.to_string()),
                other => ConversationError::Failed(other.to_string()),
            })?;
        speech_from_response(&reply)
    }
}

/// Periodically mirror Home Assistant states into `store`
pub fn spawn_state_sync(
    client: Arc<RestClient>,
    store: Arc<StateStore>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut healthy = true;
        loop {
            ticker.tick().await;
            match client.sync_into(&store).await {
                Ok(count) if !healthy => {
                    info!(count, "state sync recovered");
                    healthy = true;
                }
                Ok(_) => {}
                Err(e) => {
                    if healthy {
                        warn!(error = %e, "state sync failed");
                    }
                    healthy = false;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventBus;
    use axum::{http::HeaderMap, routing::get, routing::post, Json, Router};
    use hass_ai_core::Language;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        format!("http://{addr}")
    }

    fn fake_ha() -> Router {
        Router::new()
            .route(
                "/api/states",
                get(|headers: HeaderMap| async move {
                    assert_eq!(headers["authorization"], "Bearer t0k");
                    Json(json!([
                        {"entity_id": "light.kitchen", "state": "on", "attributes": {"friendly_name": "Kitchen"}},
                        {"entity_id": "Not Valid", "state": "on"},
                        {"entity_id": "sensor.battery_1", "state": "12", "attributes": {}}
                    ]))
                }),
            )
            .route(
                "/api/conversation/process",
                post(|Json(body): Json<Value>| async move {
                    Json(json!({"response": {"response_type": "action_done",
                        "speech": {"plain": {"speech": format!("got {}", body["language"].as_str().unwrap_or_default())}}}}))
                }),
            )
    }

    #[tokio::test]
    async fn test_fetch_and_sync_states() {
        let url = serve(fake_ha()).await;
        let client = RestClient::new(format!("{url}/"), "t0k", Duration::from_secs(5)).unwrap();

        let states = client.fetch_states().await.unwrap();
        assert_eq!(states.len(), 2);
        assert_eq!(states[0].friendly_name, "Kitchen");

        let store = StateStore::new(Arc::new(EventBus::new()));
        assert_eq!(client.sync_into(&store).await.unwrap(), 2);
        assert!(store.get("sensor.battery_1").is_some());
    }

    #[tokio::test]
    async fn test_conversation_over_rest() {
        let url = serve(fake_ha()).await;
        let client = RestClient::new(url, "t0k", Duration::from_secs(5)).unwrap();
        let speech = client
            .process(ConversationRequest {
                text: "rate these".into(),
                language: Language::It,
                agent_id: None,
            })
            .await
            .unwrap();
        assert_eq!(speech, "got it");
    }

    #[tokio::test]
    async fn test_unknown_service_maps_to_not_found() {
        let url = serve(fake_ha()).await;
        let client = RestClient::new(url, "t0k", Duration::from_secs(5)).unwrap();
        let err = client
            .call_service("notify", "nope", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceCallError::NotFound { .. }));
    }
}
