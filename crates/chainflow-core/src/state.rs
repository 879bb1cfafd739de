//! Shared application state for the HTTP server and CLI.

use std::sync::Arc;

use crate::chain::{ChainOrchestrator, RunLedger, StepExecutor};
use crate::config::EngineConfig;
use crate::db::Database;
use crate::events::EventBus;
use crate::generation::Generator;
use crate::store::{EntityStore, ProjectStore, RunStore, WorkflowStore};

/// Shared state accessible by all API handlers.
pub struct AppStateInner {
    pub db: Database,
    pub project_store: ProjectStore,
    pub workflow_store: WorkflowStore,
    pub entity_store: EntityStore,
    pub run_store: RunStore,
    pub ledger: RunLedger,
    pub event_bus: EventBus,
    pub orchestrator: ChainOrchestrator,
    pub engine: EngineConfig,
}

pub type AppState = Arc<AppStateInner>;

impl AppStateInner {
    pub fn new(db: Database, generator: Arc<dyn Generator>, engine: EngineConfig) -> Self {
        let event_bus = EventBus::with_keep_alive(engine.keep_alive);
        let ledger = RunLedger::new(RunStore::new(db.clone()));
        let orchestrator = ChainOrchestrator::new(
            WorkflowStore::new(db.clone()),
            EntityStore::new(db.clone()),
            ledger.clone(),
            StepExecutor::new(generator, event_bus.clone()),
            event_bus.clone(),
        )
        .with_step_timeout(engine.step_timeout);

        Self {
            project_store: ProjectStore::new(db.clone()),
            workflow_store: WorkflowStore::new(db.clone()),
            entity_store: EntityStore::new(db.clone()),
            run_store: RunStore::new(db.clone()),
            ledger,
            event_bus,
            orchestrator,
            engine,
            db,
        }
    }
}
