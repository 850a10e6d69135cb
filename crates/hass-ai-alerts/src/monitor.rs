//! The alert monitor: polling loop, throttling and delivery

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use hass_ai_config::AlertSettings;
use hass_ai_core::{
    Category, EntitySnapshot, Language, ScoreResult, ServiceCaller, StateSource, MAX_WEIGHT,
};
use hass_ai_hub::EventBus;
use hass_ai_intelligence::ConversationClient;
use hass_ai_storage::{IntelligenceData, Storage};
use serde_json::{json, Value};
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{AlertConfigData, DeliverySettingsUpdate, MonitoredEntity};
use crate::message::{fallback_message, sort_by_priority, AlertDetail, MessagePrompts};
use crate::report::{ActiveAlert, AlertReport, AlertStatus, AlertSummary, EntityReport, EntityStatus};
use crate::threshold::{Observed, Thresholds};
use crate::validity::{alerts_on_low, auto_thresholds, entity_type, is_valid_alert_entity};
use crate::{check_interval, AlertError, AlertLevel, AlertResult};

/// Event fired on the bus around every monitoring pass
pub const MONITORING_SIGNAL: &str = "hass_ai_monitoring_signal";
pub const NOTIFICATION_TITLE: &str = "🏠 HASS AI Alert";
/// `input_text` entities hold at most this many characters
pub const INPUT_TEXT_MAX_CHARS: usize = 1000;

/// Level an entity is currently in, if any
pub fn evaluate_entity(entity: Option<&EntitySnapshot>, thresholds: &Thresholds) -> Option<AlertLevel> {
    let entity = entity.filter(|e| !e.is_unavailable())?;
    let observed = Observed::from_snapshot(entity)?;
    thresholds.evaluate(observed, alerts_on_low(entity))
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

pub struct AlertMonitor {
    states: Arc<dyn StateSource>,
    services: Arc<dyn ServiceCaller>,
    bus: Arc<EventBus>,
    storage: Arc<Storage>,
    agent: Option<Arc<ConversationClient>>,
    prompts: MessagePrompts,
    settings: AlertSettings,
    language: Language,
    config: RwLock<AlertConfigData>,
    last_notifications: DashMap<String, DateTime<Utc>>,
    monitoring: AtomicBool,
}

impl AlertMonitor {
    pub fn new(
        states: Arc<dyn StateSource>,
        services: Arc<dyn ServiceCaller>,
        bus: Arc<EventBus>,
        storage: Arc<Storage>,
        settings: AlertSettings,
        language: Language,
    ) -> AlertResult<Self> {
        let prompts = MessagePrompts::new().map_err(|e| AlertError::Template(e.to_string()))?;
        Ok(Self {
            states,
            services,
            bus,
            storage,
            agent: None,
            prompts,
            settings,
            language,
            config: RwLock::new(AlertConfigData::default()),
            last_notifications: DashMap::new(),
            monitoring: AtomicBool::new(false),
        })
    }

    /// Let the conversation agent write notification text
    pub fn with_agent(mut self, agent: Arc<ConversationClient>) -> Self {
        self.agent = Some(agent);
        self
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitoring.load(Ordering::SeqCst)
    }

    pub async fn config(&self) -> AlertConfigData {
        self.config.read().await.clone()
    }

    async fn persist(&self, data: &mut AlertConfigData) -> AlertResult<()> {
        data.last_update = Some(Utc::now());
        self.storage.save(data).await?;
        debug!(entities = data.monitored_entities.len(), "alert configuration saved");
        Ok(())
    }

    fn forget(&self, entity_id: &str) {
        self.last_notifications.remove(entity_id);
    }

    /// Load the stored configuration and drop entities no longer suitable
    #[instrument(skip(self))]
    pub async fn load(&self) -> AlertResult<usize> {
        let mut data: AlertConfigData = self.storage.load().await?;

        let mut invalid = Vec::new();
        for entity_id in data.monitored_entities.keys() {
            let state = self.states.get_state(entity_id).await;
            if !state.as_ref().is_some_and(is_valid_alert_entity) {
                warn!(entity_id, "removing entity unsuitable for alerts");
                invalid.push(entity_id.clone());
            }
        }
        for entity_id in &invalid {
            data.monitored_entities.remove(entity_id);
            self.forget(entity_id);
        }
        if !invalid.is_empty() {
            self.persist(&mut data).await?;
        }

        let count = data.monitored_entities.len();
        info!(
            entities = count,
            mode = if data.use_input_text { "input_text" } else { "notification" },
            "loaded alert configuration"
        );
        *self.config.write().await = data;
        Ok(count)
    }

    fn signal(&self, kind: &str, details: Value) {
        self.bus.fire(
            MONITORING_SIGNAL,
            json!({
                "type": format!("hass_ai_monitoring_{kind}"),
                "timestamp": Utc::now().to_rfc3339(),
                "details": details,
            }),
        );
    }

    fn should_notify(&self, entity_id: &str, level: AlertLevel, now: DateTime<Utc>) -> bool {
        match self.last_notifications.get(entity_id) {
            None => true,
            Some(last) => now
                .signed_duration_since(*last)
                .to_std()
                .map_or(false, |elapsed| elapsed >= level.throttle()),
        }
    }

    /// One monitoring pass; returns the alerts that were notified
    #[instrument(skip(self))]
    pub async fn check_all(&self, now: DateTime<Utc>) -> AlertResult<Vec<AlertDetail>> {
        let entries: Vec<(String, MonitoredEntity)> = self
            .config
            .read()
            .await
            .monitored_entities
            .iter()
            .map(|(id, cfg)| (id.clone(), cfg.clone()))
            .collect();
        self.signal("start", json!({"count": entries.len()}));

        let mut checked = 0;
        let mut updates: Vec<(String, Option<AlertLevel>)> = Vec::new();
        let mut triggered = Vec::new();

        for (entity_id, cfg) in entries {
            if !cfg.enabled || cfg.thresholds.is_empty() || cfg.weight < self.settings.min_weight_filter {
                continue;
            }
            checked += 1;

            let due = cfg.last_check.map_or(true, |last| {
                now.signed_duration_since(last)
                    .to_std()
                    .map_or(true, |elapsed| elapsed >= check_interval(cfg.weight))
            });
            if !due {
                continue;
            }

            let state = self.states.get_state(&entity_id).await;
            let level = evaluate_entity(state.as_ref(), &cfg.thresholds);
            updates.push((entity_id.clone(), level));

            if let (Some(level), Some(state)) = (level, state) {
                if self.should_notify(&entity_id, level, now) {
                    triggered.push(AlertDetail {
                        entity_id: entity_id.clone(),
                        name: state.friendly_name.clone(),
                        level,
                        value: state.state.clone(),
                        unit: state.unit().unwrap_or_default().to_string(),
                        weight: cfg.weight,
                    });
                }
            }
        }

        {
            let mut config = self.config.write().await;
            for (entity_id, level) in updates {
                if let Some(cfg) = config.monitored_entities.get_mut(&entity_id) {
                    cfg.last_check = Some(now);
                    cfg.current_level = level;
                }
            }
        }

        let delivered = if triggered.is_empty() {
            Ok(())
        } else {
            self.notify(&mut triggered).await
        };
        if delivered.is_ok() {
            for alert in &triggered {
                self.last_notifications.insert(alert.entity_id.clone(), now);
            }
        }

        self.signal("end", json!({"entities_checked": checked}));
        delivered.map(|_| triggered)
    }

    async fn notify(&self, alerts: &mut [AlertDetail]) -> AlertResult<()> {
        sort_by_priority(alerts);
        let message = self.generate_message(alerts).await;
        let critical = alerts.iter().any(|a| a.level == AlertLevel::Critical);
        self.deliver(&message, critical).await?;
        info!(alerts = alerts.len(), "sent alert notification");
        Ok(())
    }

    async fn generate_message(&self, alerts: &[AlertDetail]) -> String {
        if let Some(agent) = &self.agent {
            match self
                .prompts
                .render(alerts, self.language, self.settings.use_friendly_messages)
            {
                Ok(prompt) => match agent.query(&prompt, self.language).await {
                    Ok(reply) if !reply.trim().is_empty() => return reply.trim().to_string(),
                    Ok(_) => warn!("agent returned an empty alert message"),
                    Err(e) => warn!(error = %e, "agent could not write alert message"),
                },
                Err(e) => error!(error = %e, "failed to render alert prompt"),
            }
        }
        fallback_message(alerts, self.language)
    }

    async fn deliver(&self, message: &str, critical: bool) -> AlertResult<()> {
        let (use_input_text, target) = {
            let config = self.config.read().await;
            if config.use_input_text {
                (true, config.input_text_entity.clone())
            } else {
                (false, config.notification_service.clone())
            }
        };

        if use_input_text {
            let stamped = format!("[{}] {message}", Utc::now().format("%H:%M:%S"));
            self.services
                .call_service(
                    "input_text",
                    "set_value",
                    json!({"entity_id": target, "value": truncate_chars(&stamped, INPUT_TEXT_MAX_CHARS)}),
                )
                .await?;
        } else {
            let service = target.strip_prefix("notify.").unwrap_or(&target);
            self.services
                .call_service(
                    "notify",
                    service,
                    json!({
                        "title": NOTIFICATION_TITLE,
                        "message": message,
                        "data": {
                            "priority": if critical { "high" } else { "normal" },
                            "tag": "hass_ai_alert",
                            "actions": [
                                {"action": "view_alerts", "title": "View Alerts"},
                                {"action": "dismiss", "title": "Dismiss"}
                            ]
                        }
                    }),
                )
                .await?;
        }
        Ok(())
    }

    /// Sync the monitored set with the latest scan results
    ///
    /// Keeps only enabled, valid entities in the ALERTS category. New ones
    /// get automatic thresholds; existing ones keep theirs and pick up the
    /// current effective weight.
    #[instrument(skip_all, fields(results = results.len()))]
    pub async fn update_monitored_entities(
        &self,
        results: &[ScoreResult],
        intelligence: &IntelligenceData,
    ) -> AlertResult<usize> {
        let input_text_entity = self.config.read().await.input_text_entity.clone();

        let mut candidates: BTreeMap<String, (u8, EntitySnapshot)> = BTreeMap::new();
        let mut filtered = 0;
        for result in results {
            let entity_id = result.entity_id.as_str();
            if entity_id == input_text_entity
                || !result.has_category(Category::Alerts)
                || !intelligence.is_enabled(entity_id)
            {
                continue;
            }
            match self.states.get_state(entity_id).await {
                Some(state) if is_valid_alert_entity(&state) => {
                    candidates.insert(
                        entity_id.to_string(),
                        (intelligence.effective_weight(result), state),
                    );
                }
                _ => filtered += 1,
            }
        }

        let mut config = self.config.write().await;
        let before: Vec<String> = config.monitored_entities.keys().cloned().collect();
        for entity_id in before {
            let keep = candidates.contains_key(&entity_id)
                && config
                    .monitored_entities
                    .get(&entity_id)
                    .is_some_and(|cfg| !cfg.thresholds.is_empty());
            if !keep {
                debug!(entity_id, "no longer monitored");
                config.monitored_entities.remove(&entity_id);
                self.forget(&entity_id);
            }
        }

        for (entity_id, (weight, state)) in candidates {
            if let Some(existing) = config.monitored_entities.get_mut(&entity_id) {
                existing.weight = weight;
                continue;
            }
            match auto_thresholds(&state) {
                Some(thresholds) => {
                    let entry = MonitoredEntity::new(weight, thresholds, entity_type(&entity_id));
                    config.monitored_entities.insert(entity_id, entry);
                }
                None => debug!(entity_id, "no automatic thresholds, skipping"),
            }
        }

        if filtered > 0 {
            info!(filtered, "ALERTS entities unsuitable for monitoring");
        }
        let count = config.monitored_entities.len();
        self.persist(&mut config).await?;
        info!(monitored = count, "updated monitored entities");
        Ok(count)
    }

    /// Set explicit thresholds (and optionally weight) for one entity
    #[instrument(skip(self, thresholds))]
    pub async fn configure_alert(
        &self,
        entity_id: &str,
        thresholds: Thresholds,
        weight: Option<u8>,
    ) -> AlertResult<()> {
        let state = self
            .states
            .get_state(entity_id)
            .await
            .filter(is_valid_alert_entity)
            .ok_or_else(|| AlertError::InvalidEntity(entity_id.to_string()))?;
        if thresholds.is_empty() {
            return Err(AlertError::NoThresholds(entity_id.to_string()));
        }
        if let Some(w) = weight.filter(|w| !(1..=MAX_WEIGHT).contains(w)) {
            return Err(AlertError::InvalidWeight(w));
        }

        let mut config = self.config.write().await;
        let weight = weight
            .or_else(|| config.monitored_entities.get(entity_id).map(|c| c.weight))
            .unwrap_or(crate::config::DEFAULT_WEIGHT);
        config.monitored_entities.insert(
            entity_id.to_string(),
            MonitoredEntity::new(weight, thresholds, entity_type(state.entity_id.as_str())),
        );
        self.forget(entity_id);
        self.persist(&mut config).await?;
        info!(entity_id, weight, "configured alert thresholds");
        Ok(())
    }

    pub async fn update_delivery(&self, update: DeliverySettingsUpdate) -> AlertResult<()> {
        let mut config = self.config.write().await;
        config.apply(update);
        self.persist(&mut config).await?;
        info!(
            service = %config.notification_service,
            use_input_text = config.use_input_text,
            "updated alert delivery settings"
        );
        Ok(())
    }

    pub async fn status(&self) -> AlertStatus {
        let config = self.config().await;
        let mut active_alerts = BTreeMap::new();
        let mut all_alert_entities = BTreeMap::new();

        for (entity_id, cfg) in &config.monitored_entities {
            let state = self.states.get_state(entity_id).await;
            let level = evaluate_entity(state.as_ref(), &cfg.thresholds);
            let friendly_name = state
                .as_ref()
                .map_or_else(|| entity_id.clone(), |s| s.friendly_name.clone());
            let current_value = state
                .as_ref()
                .map_or_else(|| "unknown".to_string(), |s| s.state.clone());
            let unit = state
                .as_ref()
                .and_then(|s| s.unit())
                .unwrap_or_default()
                .to_string();

            if let Some(level) = level {
                active_alerts.insert(
                    entity_id.clone(),
                    ActiveAlert {
                        level,
                        value: current_value.clone(),
                        weight: cfg.weight,
                        thresholds: cfg.thresholds.clone(),
                        friendly_name: friendly_name.clone(),
                        unit: unit.clone(),
                    },
                );
            }
            all_alert_entities.insert(
                entity_id.clone(),
                EntityStatus {
                    friendly_name,
                    current_value,
                    unit,
                    device_class: state
                        .as_ref()
                        .and_then(|s| s.device_class())
                        .unwrap_or_default()
                        .to_string(),
                    weight: cfg.weight,
                    thresholds: cfg.thresholds.clone(),
                    entity_type: cfg.entity_type.clone(),
                    last_check: cfg.last_check,
                    enabled: cfg.enabled,
                    is_alert: level.is_some(),
                    alert_level: level,
                },
            );
        }

        AlertStatus {
            monitoring_enabled: self.is_monitoring(),
            total_monitored: config.monitored_entities.len(),
            active_alerts,
            all_alert_entities,
            input_text_exists: self.states.get_state(&config.input_text_entity).await.is_some(),
            notification_service: config.notification_service,
            use_input_text: config.use_input_text,
            input_text_entity: config.input_text_entity,
            last_check: Utc::now(),
        }
    }

    pub async fn report(&self) -> AlertReport {
        let config = self.config().await;
        let mut summary = AlertSummary::default();
        let mut monitored_entities = BTreeMap::new();

        for (entity_id, cfg) in &config.monitored_entities {
            let state = self.states.get_state(entity_id).await;
            let level = evaluate_entity(state.as_ref(), &cfg.thresholds);
            summary.count(cfg.enabled, level);

            let domain = entity_id.split('.').next().unwrap_or_default().to_string();
            let entry = match &state {
                Some(s) => EntityReport {
                    entity_id: entity_id.clone(),
                    friendly_name: s.friendly_name.clone(),
                    domain,
                    current_state: s.state.clone(),
                    unit: s.unit().unwrap_or_default().to_string(),
                    device_class: s.device_class().unwrap_or_default().to_string(),
                    weight: cfg.weight,
                    entity_type: cfg.entity_type.clone(),
                    thresholds: cfg.thresholds.clone(),
                    enabled: cfg.enabled,
                    last_check: cfg.last_check,
                    current_alert_level: level,
                    is_valid_state: !s.is_unavailable(),
                    state_attributes: s.attributes.clone(),
                },
                None => EntityReport {
                    entity_id: entity_id.clone(),
                    friendly_name: entity_id.clone(),
                    domain,
                    current_state: "unavailable".to_string(),
                    unit: String::new(),
                    device_class: String::new(),
                    weight: cfg.weight,
                    entity_type: cfg.entity_type.clone(),
                    thresholds: cfg.thresholds.clone(),
                    enabled: cfg.enabled,
                    last_check: cfg.last_check,
                    current_alert_level: None,
                    is_valid_state: false,
                    state_attributes: Default::default(),
                },
            };
            monitored_entities.insert(entity_id.clone(), entry);
        }

        AlertReport {
            timestamp: Utc::now(),
            monitoring_enabled: self.is_monitoring(),
            monitored_entities,
            alert_summary: summary,
        }
    }

    /// Run the polling loop until `shutdown` flips to true
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            if self.monitoring.swap(true, Ordering::SeqCst) {
                warn!("alert monitoring already running");
                return;
            }
            info!("alert monitoring started");
            let poll = Duration::from_secs(self.settings.poll_interval_secs);
            let backoff = Duration::from_secs(self.settings.error_backoff_secs);

            loop {
                let delay = match self.check_all(Utc::now()).await {
                    Ok(_) => poll,
                    Err(e) => {
                        error!(error = %e, "alert monitoring pass failed");
                        backoff
                    }
                };
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            self.monitoring.store(false, Ordering::SeqCst);
            info!("alert monitoring stopped");
        })
    }
}
