//! CLI command implementations.
//!
//! Each submodule corresponds to a top-level CLI command and reuses
//! the chainflow-core domain logic through `AppState`.

pub mod entity;
pub mod project;
pub mod run;
pub mod server;
pub mod workflow;

use std::sync::Arc;

use chainflow_core::config::{EngineConfig, GeneratorConfig};
use chainflow_core::generation::{Generator, HttpGenerator};
use chainflow_core::state::AppState;

/// Initialize a shared `AppState` from the given SQLite database path.
///
/// Mirrors `chainflow_server::create_app_state`; exits the process on
/// failure.
pub async fn init_state(db_path: &str) -> AppState {
    let db = chainflow_core::Database::open(db_path).unwrap_or_else(|e| {
        eprintln!("Failed to open database '{}': {}", db_path, e);
        std::process::exit(1);
    });

    let generator_config = GeneratorConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Invalid generator configuration: {}", e);
        std::process::exit(1);
    });
    let engine = EngineConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Invalid engine configuration: {}", e);
        std::process::exit(1);
    });
    let generator: Arc<dyn Generator> = Arc::new(HttpGenerator::new(generator_config));

    let state: AppState = Arc::new(chainflow_core::AppStateInner::new(db, generator, engine));

    if let Err(e) = state.project_store.ensure_default().await {
        eprintln!("Failed to initialize default project: {}", e);
        std::process::exit(1);
    }

    state
}

/// Pretty-print a JSON value to stdout.
pub fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}
