//! HASS AI service
//!
//! Main entry point: loads `hass_ai.yaml`, wires the scanner and the alert
//! monitor to either a remote Home Assistant or the in-process hub, and
//! serves the panel API until Ctrl-C.

mod rescan;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use hass_ai_alerts::AlertMonitor;
use hass_ai_api::{start_server, AppState};
use hass_ai_config::HassAiConfig;
use hass_ai_core::{ConversationAgent, ServiceCaller, StateSource};
use hass_ai_hub::{spawn_state_sync, Hub, RestClient, ServiceConversationAgent};
use hass_ai_intelligence::{ConversationClient, Scanner};
use hass_ai_storage::Storage;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "hass-ai", about = "AI-driven entity importance and alerting for Home Assistant")]
#[command(version)]
struct Args {
    /// Path to hass_ai.yaml
    #[arg(short, long, env = "HASS_AI_CONFIG", default_value = "hass_ai.yaml")]
    config: PathBuf,

    /// Listen address, overriding `server.bind`
    #[arg(short, long, env = "HASS_AI_BIND")]
    bind: Option<String>,
}

/// Host seams the service talks to
struct Backends {
    hub: Hub,
    states: Arc<dyn StateSource>,
    services: Arc<dyn ServiceCaller>,
    agent: Arc<dyn ConversationAgent>,
}

impl Backends {
    /// Remote Home Assistant when one is configured, the bare hub otherwise
    async fn connect(config: &HassAiConfig) -> Result<Self> {
        let hub = Hub::new();
        let Some(ha) = &config.home_assistant else {
            warn!("no home_assistant section, running against the in-process hub");
            return Ok(Self {
                states: hub.states.clone(),
                services: hub.services.clone(),
                agent: Arc::new(ServiceConversationAgent::new(hub.services.clone())),
                hub,
            });
        };

        let client = Arc::new(
            RestClient::new(
                &ha.url,
                &ha.token,
                Duration::from_secs(ha.request_timeout_secs),
            )
            .context("building Home Assistant client")?,
        );
        match client.sync_into(&hub.states).await {
            Ok(count) => info!(url = %ha.url, count, "connected to Home Assistant"),
            Err(e) => warn!(url = %ha.url, error = %e, "initial state sync failed, will retry"),
        }
        spawn_state_sync(
            client.clone(),
            hub.states.clone(),
            Duration::from_secs(ha.sync_interval_secs),
        );

        Ok(Self {
            states: hub.states.clone(),
            services: client.clone(),
            agent: client,
            hub,
        })
    }
}

fn load_config(args: &Args) -> Result<HassAiConfig> {
    let mut config = if args.config.exists() {
        HassAiConfig::load(&args.config)
            .with_context(|| format!("loading {}", args.config.display()))?
    } else {
        warn!(path = %args.config.display(), "config file not found, using defaults");
        HassAiConfig::default()
    };
    if let Some(bind) = &args.bind {
        config.server.bind = bind.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let args = Args::parse();
    info!(version = env!("CARGO_PKG_VERSION"), "Starting HASS AI");

    let config = load_config(&args)?;
    let backends = Backends::connect(&config).await?;
    let storage = Arc::new(Storage::new(&config.data_dir));

    let entry = config.integration.as_ref();
    let scanner = Arc::new(
        Scanner::new(
            backends.states.clone(),
            backends.agent.clone(),
            storage.clone(),
            entry,
            config.scan.clone(),
        )
        .context("building scanner")?,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::new();

    let alerts = if config.alerts.enabled {
        let mut monitor = AlertMonitor::new(
            backends.states.clone(),
            backends.services.clone(),
            backends.hub.bus.clone(),
            storage.clone(),
            config.alerts.clone(),
            config.scan.language,
        )
        .context("building alert monitor")?;
        if let Some(entry) = entry {
            let writer = ConversationClient::new(backends.agent.clone())
                .with_agent(entry.agent().map(str::to_string));
            monitor = monitor.with_agent(Arc::new(writer));
        }
        let monitor = Arc::new(monitor);
        let loaded = monitor.load().await.context("loading alert configuration")?;
        info!(monitored = loaded, "alert monitor ready");
        tasks.push(monitor.clone().spawn(shutdown_rx.clone()));
        Some(monitor)
    } else {
        info!("alert monitoring disabled");
        None
    };

    let state = AppState::new(scanner, alerts)
        .with_api_token(config.server.api_token.clone())
        .with_panel_dir(config.server.panel_dir.clone());

    match entry {
        Some(entry) => tasks.push(rescan::spawn(
            state.clone(),
            entry.rescan_period(),
            shutdown_rx.clone(),
        )),
        None => warn!("integration not configured, scans use fallback classification"),
    }

    info!(bind = %config.server.bind, "HASS AI is running");
    let shutdown = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
        info!("Shutting down...");
        let _ = shutdown_tx.send(true);
    };
    start_server(state, &config.server.bind, shutdown)
        .await
        .with_context(|| format!("serving on {}", config.server.bind))?;

    for task in tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "background task ended abnormally");
        }
    }
    Ok(())
}
