//! Chainflow Server — HTTP front end for the chain engine.
//!
//! Exposes workflow/entity CRUD, the run trigger, run queries and a
//! server-sent-events feed of the event bus. All domain logic lives in
//! `chainflow-core`; this crate only maps HTTP onto it.

pub mod api;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use chainflow_core::config::{EngineConfig, GeneratorConfig};
use chainflow_core::generation::{Generator, HttpGenerator};
use chainflow_core::{AppState, AppStateInner, Database};

/// Configuration for the Chainflow HTTP server.
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8006,
            db_path: "chainflow.db".to_string(),
        }
    }
}

/// Create a shared `AppState` from a database path, with the generation
/// backend and engine settings taken from the environment.
pub async fn create_app_state(db_path: &str) -> Result<AppState, String> {
    let db = Database::open(db_path).map_err(|e| format!("Failed to open database: {}", e))?;

    let generator_config =
        GeneratorConfig::from_env().map_err(|e| format!("Invalid generator config: {}", e))?;
    if generator_config.api_key.is_empty() {
        tracing::warn!("No API key configured; triggered runs will fail at the first step");
    }
    tracing::info!(
        "Generation backend: {} {} (model {})",
        generator_config.adapter.as_str(),
        generator_config.base_url,
        generator_config.model
    );
    let generator: Arc<dyn Generator> = Arc::new(HttpGenerator::new(generator_config));

    let engine = EngineConfig::from_env().map_err(|e| format!("Invalid engine config: {}", e))?;

    create_app_state_with(db, generator, engine).await
}

/// Build the state around an already opened database and generator.
pub async fn create_app_state_with(
    db: Database,
    generator: Arc<dyn Generator>,
    engine: EngineConfig,
) -> Result<AppState, String> {
    let state: AppState = Arc::new(AppStateInner::new(db, generator, engine));

    state
        .project_store
        .ensure_default()
        .await
        .map_err(|e| format!("Failed to initialize default project: {}", e))?;

    Ok(state)
}

/// Start the Chainflow HTTP server.
///
/// Returns the actual address the server is listening on.
pub async fn start_server(config: ServerConfig) -> Result<SocketAddr, String> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "chainflow_server=info,chainflow_core=info,tower_http=info".into()
            }),
        )
        .init();

    tracing::info!(
        "Starting Chainflow server on {}:{}",
        config.host,
        config.port
    );

    let state = create_app_state(&config.db_path).await?;

    start_server_with_state(config, state).await
}

/// Build the full application router around `state`.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api::api_router())
        .route("/health", axum::routing::get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server with a pre-built `AppState`.
pub async fn start_server_with_state(
    config: ServerConfig,
    state: AppState,
) -> Result<SocketAddr, String> {
    if let Some(interval) = state.engine.background_tick {
        tracing::info!("Broadcasting background updates every {:?}", interval);
        state.event_bus.spawn_background_updates(interval);
    }

    let app = app(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| format!("Invalid address: {}", e))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind to {}: {}", addr, e))?;

    let local_addr = listener
        .local_addr()
        .map_err(|e| format!("Failed to get local address: {}", e))?;

    tracing::info!("Chainflow server listening on {}", local_addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok(local_addr)
}

/// 200 while the database answers, 503 otherwise.
async fn health_check(
    State(state): State<AppState>,
) -> (StatusCode, axum::Json<serde_json::Value>) {
    let (status, database) = match state.db.ping().await {
        Ok(()) => (StatusCode::OK, "connected".to_string()),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, format!("error: {}", e))
        }
    };
    let body = serde_json::json!({
        "status": if status == StatusCode::OK { "healthy" } else { "unhealthy" },
        "database": database,
        "server": "chainflow-server",
        "version": env!("CARGO_PKG_VERSION"),
        "subscribers": state.event_bus.subscriber_count(),
    });
    (status, axum::Json(body))
}
