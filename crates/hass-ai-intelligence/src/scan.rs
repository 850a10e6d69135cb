//! Scan orchestration: entity selection, controller run, persistence

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hass_ai_config::{check_batch_size, ConfigEntry, ScanSettings};
use hass_ai_core::{
    CancelToken, ConversationAgent, EntitySnapshot, Language, ScoreResult, StateSource, DOMAIN,
};
use hass_ai_storage::{AiResultsData, IntelligenceData, Storage};
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::ai_log::AiLogger;
use crate::batch::{fallback_all, BatchController, ScanOutcome, ScanStatus};
use crate::conversation::ConversationClient;
use crate::correlations::{Correlation, CorrelationFinder};
use crate::error::{PromptError, ScanError, ScanResult};
use crate::events::{Diagnostic, EventSink, ScanEvent};
use crate::fallback;
use crate::prompt::PromptBuilder;

/// Domains left out of an unfiltered scan
pub const EXCLUDED_DOMAINS: &[&str] = &[DOMAIN, "persistent_notification", "system_log"];

/// Parameters of one scan, as sent by the panel
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScanRequest {
    #[serde(default)]
    pub language: Option<Language>,
    /// Substring an entity id must contain
    #[serde(default)]
    pub entity_filter: Option<String>,
    #[serde(default)]
    pub batch_size: Option<usize>,
}

/// Agent-backed parts that only exist once the integration is configured
struct Configured {
    client: Arc<ConversationClient>,
    correlations: CorrelationFinder,
}

pub struct Scanner {
    states: Arc<dyn StateSource>,
    storage: Arc<Storage>,
    prompts: Arc<PromptBuilder>,
    logger: Arc<AiLogger>,
    configured: Option<Configured>,
    settings: ScanSettings,
}

impl Scanner {
    pub fn new(
        states: Arc<dyn StateSource>,
        agent: Arc<dyn ConversationAgent>,
        storage: Arc<Storage>,
        entry: Option<&ConfigEntry>,
        settings: ScanSettings,
    ) -> Result<Self, PromptError> {
        let provider = entry
            .map(|e| e.ai_provider.clone())
            .unwrap_or_else(|| hass_ai_core::AI_PROVIDER_LOCAL.to_string());
        let logger = Arc::new(AiLogger::new(settings.log_dir.clone(), provider));

        let configured = match entry {
            Some(entry) => {
                let (min, max) = settings.pacing();
                let agent_id = entry.agent().map(str::to_string);
                let client = Arc::new(
                    ConversationClient::new(agent.clone())
                        .with_agent(agent_id.clone())
                        .with_pacing(min, max),
                );
                let correlation_client = Arc::new(
                    ConversationClient::new(agent)
                        .with_agent(agent_id)
                        .with_pacing(min, max)
                        .with_timeout(Duration::from_secs(settings.correlation_timeout_secs)),
                );
                Some(Configured {
                    client,
                    correlations: CorrelationFinder::new(correlation_client, storage.clone())?,
                })
            }
            None => None,
        };

        Ok(Self {
            states,
            storage,
            prompts: Arc::new(PromptBuilder::new()?),
            logger,
            configured,
            settings,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.configured.is_some()
    }

    pub fn logger(&self) -> &Arc<AiLogger> {
        &self.logger
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    /// Entities a scan would cover, sorted by id
    pub async fn select_entities(&self, entity_filter: Option<&str>) -> Vec<EntitySnapshot> {
        let filter = entity_filter.map(str::trim).filter(|f| !f.is_empty());
        let mut entities: Vec<EntitySnapshot> = self
            .states
            .all_states()
            .await
            .into_iter()
            .filter(|e| match filter {
                Some(f) => e.entity_id.as_str().contains(f),
                None => !EXCLUDED_DOMAINS.contains(&e.domain.as_str()),
            })
            .collect();
        entities.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        entities
    }

    fn controller(&self, language: Language, batch_size: usize) -> Option<BatchController> {
        self.configured.as_ref().map(|c| {
            BatchController::new(self.prompts.clone(), c.client.clone(), language, batch_size)
                .with_logger(self.logger.clone())
        })
    }

    /// Run a full scan; only an invalid request is an error
    #[instrument(skip(self, sink, cancel), fields(filter = ?request.entity_filter))]
    pub async fn scan(
        &self,
        request: ScanRequest,
        sink: &EventSink,
        cancel: &CancelToken,
    ) -> ScanResult<ScanOutcome> {
        let batch_size = request.batch_size.unwrap_or(self.settings.batch_size);
        check_batch_size(batch_size)?;
        let language = request.language.unwrap_or(self.settings.language);

        let entities = self.select_entities(request.entity_filter.as_deref()).await;
        info!(count = entities.len(), batch_size, language = language.code(), "scan requested");

        let outcome = match self.controller(language, batch_size) {
            Some(controller) => controller.run(entities, sink, cancel).await,
            None => {
                warn!("integration not configured, classifying every entity locally");
                sink.emit(ScanEvent::Diagnostic {
                    data: Diagnostic {
                        message: "HASS AI is not configured; using fallback classification".to_string(),
                    },
                });
                fallback_all(entities, sink)
            }
        };

        if outcome.status != ScanStatus::Cancelled {
            self.persist(&outcome.results).await;
        }
        Ok(outcome)
    }

    async fn persist(&self, results: &[ScoreResult]) {
        let now = Utc::now();

        match self.storage.load::<AiResultsData>().await {
            Ok(mut stored) => {
                for result in results {
                    stored
                        .results
                        .insert(result.entity_id.to_string(), result.clone());
                }
                stored.total_entities = stored.results.len();
                stored.last_scan_timestamp = Some(now.to_rfc3339());
                if let Err(e) = self.storage.save(&stored).await {
                    warn!(error = %e, "failed to save scan results");
                }
            }
            Err(e) => warn!(error = %e, "failed to load stored scan results"),
        }

        match self.storage.load::<IntelligenceData>().await {
            Ok(mut data) => {
                data.last_scan = Some(now);
                data.last_scan_entity_count = results.len();
                if let Err(e) = self.storage.save(&data).await {
                    warn!(error = %e, "failed to save scan bookkeeping");
                }
            }
            Err(e) => warn!(error = %e, "failed to load intelligence data"),
        }
    }

    /// Score a single entity with a one-entity batch
    #[instrument(skip(self))]
    pub async fn score_entity(&self, entity_id: &str, language: Option<Language>) -> ScanResult<ScoreResult> {
        let entity = self
            .states
            .get_state(entity_id)
            .await
            .ok_or_else(|| ScanError::EntityNotFound(entity_id.to_string()))?;
        let language = language.unwrap_or(self.settings.language);

        let Some(controller) = self.controller(language, 1) else {
            return Ok(fallback::classify(&entity, 1));
        };
        let outcome = controller
            .run(vec![entity.clone()], &EventSink::none(), &CancelToken::new())
            .await;
        Ok(outcome
            .results
            .into_iter()
            .next()
            .unwrap_or_else(|| fallback::classify(&entity, 1)))
    }

    pub async fn find_correlations(
        &self,
        entity_id: &str,
        language: Option<Language>,
    ) -> ScanResult<Vec<Correlation>> {
        let configured = self.configured.as_ref().ok_or(ScanError::NotConfigured)?;
        let states = self.states.all_states().await;
        let language = language.unwrap_or(self.settings.language);
        Ok(configured.correlations.find(entity_id, &states, language).await?)
    }

    /// Time of the last completed scan, if any
    pub async fn last_scan(&self) -> Option<DateTime<Utc>> {
        match self.storage.load::<IntelligenceData>().await {
            Ok(data) => data.last_scan,
            Err(e) => {
                warn!(error = %e, "failed to read last scan time");
                None
            }
        }
    }
}
