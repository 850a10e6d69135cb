//! HASS AI WebSocket API
//!
//! Serves the panel's `hass_ai/*` commands over a Home Assistant style
//! WebSocket at `/api/websocket`, plus a status and a health route and,
//! when configured, the panel's static files under `/hass_ai_panel`.

mod operations;
mod websocket;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use hass_ai_alerts::AlertMonitor;
use hass_ai_intelligence::Scanner;
use hass_ai_core::ScoreResult;
use hass_ai_storage::{AiResultsData, IntelligenceData, Storage};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use operations::Operations;
pub use websocket::{
    ErrorInfo, EventMessage, IncomingMessage, OutgoingMessage, PongMessage, ResultMessage,
};

/// URL prefix the panel's files are served under
pub const PANEL_PATH: &str = "/hass_ai_panel";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub scanner: Arc<Scanner>,
    pub storage: Arc<Storage>,
    /// Absent when alert monitoring is disabled
    pub alerts: Option<Arc<AlertMonitor>>,
    pub operations: Arc<Operations>,
    /// Token clients must present; any token is accepted when unset
    pub api_token: Option<String>,
    pub panel_dir: Option<PathBuf>,
}

impl AppState {
    pub fn new(scanner: Arc<Scanner>, alerts: Option<Arc<AlertMonitor>>) -> Self {
        Self {
            storage: scanner.storage().clone(),
            scanner,
            alerts,
            operations: Arc::new(Operations::new()),
            api_token: None,
            panel_dir: None,
        }
    }

    pub fn with_api_token(mut self, token: Option<String>) -> Self {
        self.api_token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn with_panel_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.panel_dir = dir;
        self
    }

    /// Re-derive the monitored entity set from every stored scan result
    ///
    /// Filtered scans merge into the stored results, so the whole set is
    /// used rather than the latest scan's.
    pub async fn refresh_alerts(&self) {
        let Some(alerts) = &self.alerts else {
            return;
        };
        let stored = match self.storage.load::<AiResultsData>().await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "cannot refresh alert entities");
                return;
            }
        };
        let intelligence = match self.storage.load::<IntelligenceData>().await {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "cannot refresh alert entities");
                return;
            }
        };
        let results: Vec<ScoreResult> = stored.results.into_values().collect();
        if let Err(e) = alerts.update_monitored_entities(&results, &intelligence).await {
            warn!(error = %e, "failed to update monitored entities");
        }
    }
}

#[derive(Serialize)]
struct ApiStatus {
    message: &'static str,
    version: &'static str,
    configured: bool,
    alerts_enabled: bool,
    running_operations: usize,
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        .route("/api/websocket", get(websocket::ws_handler))
        .route("/api/", get(api_status))
        .route("/api/health", get(health_check));

    if let Some(dir) = &state.panel_dir {
        info!(dir = %dir.display(), "serving panel files");
        router = router.nest_service(PANEL_PATH, ServeDir::new(dir));
    }

    router
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Serve until `shutdown` resolves
pub async fn start_server<F>(state: AppState, addr: &str, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr, "API server listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

/// GET /api/
async fn api_status(State(state): State<AppState>) -> Json<ApiStatus> {
    Json(ApiStatus {
        message: "API running.",
        version: env!("CARGO_PKG_VERSION"),
        configured: state.scanner.is_configured(),
        alerts_enabled: state.alerts.is_some(),
        running_operations: state.operations.len(),
    })
}

async fn health_check() -> &'static str {
    "OK"
}
