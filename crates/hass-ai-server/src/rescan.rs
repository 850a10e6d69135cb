//! Scheduled rescans
//!
//! Every `scan_interval` days the whole home is rescanned and the alert
//! entity set refreshed. A scheduled scan registers as an operation, so the
//! panel can stop it like any other.

use std::time::Duration;

use hass_ai_api::AppState;
use hass_ai_intelligence::{EventSink, ScanRequest, ScanStatus};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info};

/// Run one full scan unless another one is in progress
pub async fn run_once(state: &AppState) -> Option<ScanStatus> {
    if !state.operations.is_empty() {
        info!(running = state.operations.len(), "scan in progress, skipping scheduled rescan");
        return None;
    }

    let (operation_id, cancel) = state.operations.start();
    let outcome = state
        .scanner
        .scan(ScanRequest::default(), &EventSink::none(), &cancel)
        .await;
    state.operations.finish(&operation_id);

    match outcome {
        Ok(outcome) => {
            info!(
                operation_id = %operation_id,
                status = ?outcome.status,
                results = outcome.results.len(),
                "scheduled rescan finished"
            );
            if outcome.status != ScanStatus::Cancelled {
                state.refresh_alerts().await;
            }
            Some(outcome.status)
        }
        Err(e) => {
            error!(operation_id = %operation_id, error = %e, "scheduled rescan failed");
            None
        }
    }
}

/// Rescan every `period` until `shutdown` flips; the first run is one period out
pub fn spawn(state: AppState, period: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(period_secs = period.as_secs(), "scheduled rescans enabled");
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    run_once(&state).await;
                }
                _ = shutdown.changed() => break,
            }
        }
        info!("scheduled rescans stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use hass_ai_config::ScanSettings;
    use hass_ai_core::EntitySnapshot;
    use hass_ai_hub::{Hub, ServiceConversationAgent};
    use hass_ai_intelligence::Scanner;
    use hass_ai_storage::{AiResultsData, Storage};

    fn state(dir: &std::path::Path) -> AppState {
        let hub = Hub::new();
        hub.states.set(EntitySnapshot::new(
            "light.porch".parse().unwrap(),
            "off",
            HashMap::new(),
        ));
        let settings = ScanSettings {
            log_dir: dir.join("logs"),
            ..ScanSettings::default()
        };
        let scanner = Scanner::new(
            hub.states.clone(),
            Arc::new(ServiceConversationAgent::new(hub.services.clone())),
            Arc::new(Storage::new(dir)),
            None,
            settings,
        )
        .unwrap();
        AppState::new(Arc::new(scanner), None)
    }

    #[tokio::test]
    async fn test_run_once_persists_results() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());

        assert_eq!(run_once(&state).await, Some(ScanStatus::NotConfigured));
        assert!(state.operations.is_empty());

        let stored: AiResultsData = state.storage.load().await.unwrap();
        assert!(stored.results.contains_key("light.porch"));
    }

    #[tokio::test]
    async fn test_skips_while_another_scan_runs() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());

        let (operation_id, _cancel) = state.operations.start();
        assert_eq!(run_once(&state).await, None);
        state.operations.finish(&operation_id);

        let stored: AiResultsData = state.storage.load().await.unwrap();
        assert!(stored.results.is_empty());
    }

    #[tokio::test]
    async fn test_spawned_loop_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = watch::channel(false);
        let handle = spawn(state(dir.path()), Duration::from_secs(3600), rx);
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
