use std::sync::Arc;
use std::time::Duration;

use axum::routing::post;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use cligate_engine::sweeper::{start_session_sweeper, MAX_SESSION_AGE_HOURS, SWEEP_INTERVAL};
use cligate_engine::ChatOrchestrator;

use crate::{gateway, generate, messages};

/// Server configuration.
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub sweep_interval: Duration,
    pub max_session_age_hours: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            sweep_interval: SWEEP_INTERVAL,
            max_session_age_hours: MAX_SESSION_AGE_HOURS,
        }
    }
}

/// One orchestrator per backend, shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub claude: Arc<ChatOrchestrator>,
    pub gemini: Arc<ChatOrchestrator>,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/messages", post(messages::create_message))
        .route("/v1beta/models/{model_action}", post(generate::generate_content))
        .with_state(state.clone())
        .nest("/v1/claude-code", gateway::routes(Arc::clone(&state.claude)))
        .nest("/v1/gemini-cli", gateway::routes(Arc::clone(&state.gemini)))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind, serve and start the session sweeper.
pub async fn start(config: ServerConfig, state: AppState) -> Result<ServerHandle, std::io::Error> {
    let sweeper = start_session_sweeper(
        vec![Arc::clone(&state.claude), Arc::clone(&state.gemini)],
        config.sweep_interval,
        config.max_session_age_hours,
    );

    let router = build_router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(addr = %local_addr, "cligate server started");

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "server stopped");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        server,
        sweeper,
    })
}

/// Keeps the server and background tasks alive.
pub struct ServerHandle {
    pub port: u16,
    server: tokio::task::JoinHandle<()>,
    sweeper: tokio::task::JoinHandle<()>,
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.server.abort();
        self.sweeper.abort();
    }
}
