//! Sequential chain engine.
//!
//! - [`ChainOrchestrator`] walks a workflow's entities by `order` and threads
//!   each output into the next input.
//! - [`RunLedger`] records one run row per (run id, entity).
//! - [`StepExecutor`] resolves an entity's agent profile and calls the
//!   generation backend.

pub mod executor;
pub mod ledger;
pub mod orchestrator;
pub mod roles;

pub use executor::StepExecutor;
pub use ledger::RunLedger;
pub use orchestrator::{CancelHandle, ChainFailure, ChainOrchestrator, ChainOutcome};
pub use roles::{resolve_agent, AgentProfile, AgentType, InstructionOverrides, ResolvedAgent};
