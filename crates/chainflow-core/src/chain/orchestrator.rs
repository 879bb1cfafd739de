//! Sequential chain execution over a workflow's entities, in `order`.
//!
//! Per entity: open run → run step → close run → publish `run-update` →
//! carry the output forward. The first failing step is recorded as
//! `failed`, the chain stops there and the error is returned. Runs of the
//! steps that already completed are kept.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::chain::executor::StepExecutor;
use crate::chain::ledger::RunLedger;
use crate::chain::roles::InstructionOverrides;
use crate::error::ServerError;
use crate::events::{EventBus, CHAIN_COMPLETED, CHAIN_FAILED, RUN_UPDATE};
use crate::models::entity::WorkflowEntity;
use crate::models::run::{Run, RunStatus};
use crate::store::{EntityStore, WorkflowStore};

/// Cooperative cancellation flag, checked between steps.
#[derive(Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Result of a successful chain execution.
#[derive(Debug, Clone)]
pub struct ChainOutcome {
    pub run_id: String,
    pub workflow_id: String,
    pub output: String,
    pub runs: Vec<Run>,
}

/// A chain execution that stopped with an error, with the run id its rows
/// were recorded under.
#[derive(Debug, thiserror::Error)]
#[error("{source} (run {run_id})")]
pub struct ChainFailure {
    pub run_id: String,
    #[source]
    pub source: ServerError,
}

#[derive(Clone)]
pub struct ChainOrchestrator {
    workflows: WorkflowStore,
    entities: EntityStore,
    ledger: RunLedger,
    executor: StepExecutor,
    event_bus: EventBus,
    step_timeout: Option<Duration>,
}

impl ChainOrchestrator {
    pub fn new(
        workflows: WorkflowStore,
        entities: EntityStore,
        ledger: RunLedger,
        executor: StepExecutor,
        event_bus: EventBus,
    ) -> Self {
        Self {
            workflows,
            entities,
            ledger,
            executor,
            event_bus,
            step_timeout: None,
        }
    }

    /// Bound each generation call. A step exceeding it fails with
    /// [`ServerError::Timeout`].
    pub fn with_step_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.step_timeout = timeout;
        self
    }

    pub fn ledger(&self) -> &RunLedger {
        &self.ledger
    }

    /// Run a workflow under a fresh run id to completion or failure.
    ///
    /// On failure the run id is returned with the error, so the rows of the
    /// steps that did run can still be queried.
    pub async fn start(
        &self,
        workflow_id: &str,
        input_text: &str,
        overrides: Option<&InstructionOverrides>,
    ) -> Result<ChainOutcome, ChainFailure> {
        let run_id = uuid::Uuid::new_v4().to_string();
        tracing::info!("Created run ID: {} for workflow ID: {}", run_id, workflow_id);
        let result = match self.execute(workflow_id, &run_id, input_text, overrides).await {
            Ok(output) => self.ledger.status(&run_id).await.map(|runs| (output, runs)),
            Err(e) => Err(e),
        };
        let (output, runs) = result.map_err(|source| ChainFailure {
            run_id: run_id.clone(),
            source,
        })?;
        Ok(ChainOutcome {
            run_id,
            workflow_id: workflow_id.to_string(),
            output,
            runs,
        })
    }

    /// Execute `workflow_id` as execution instance `run_id`, returning the
    /// last entity's output.
    pub async fn execute(
        &self,
        workflow_id: &str,
        run_id: &str,
        initial_text: &str,
        overrides: Option<&InstructionOverrides>,
    ) -> Result<String, ServerError> {
        self.execute_with_cancel(workflow_id, run_id, initial_text, overrides, &CancelHandle::new())
            .await
    }

    /// Like [`ChainOrchestrator::execute`], stopping before the next step
    /// once `cancel` fires. A step already in flight is allowed to finish.
    pub async fn execute_with_cancel(
        &self,
        workflow_id: &str,
        run_id: &str,
        initial_text: &str,
        overrides: Option<&InstructionOverrides>,
        cancel: &CancelHandle,
    ) -> Result<String, ServerError> {
        tracing::info!("Starting workflow processing for workflow ID: {}", workflow_id);

        let workflow = self.workflows.get(workflow_id).await?.ok_or_else(|| {
            tracing::error!("Workflow with ID {} not found", workflow_id);
            ServerError::NotFound(format!("Workflow with ID {} not found", workflow_id))
        })?;

        let entities = self.entities.list_by_workflow(workflow_id).await?;
        if entities.is_empty() {
            tracing::error!("No entities found for workflow '{}'", workflow.name);
            return Err(ServerError::EmptyWorkflow(workflow.name));
        }

        let total = entities.len();
        let mut current_input = initial_text.to_string();

        for (index, entity) in entities.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::warn!(
                    "Run {} cancelled before entity {} ({}/{})",
                    run_id,
                    entity.id,
                    index + 1,
                    total
                );
                let err = ServerError::Cancelled(format!(
                    "run {} stopped before step {}/{}",
                    run_id,
                    index + 1,
                    total
                ));
                self.publish_chain_failed(workflow_id, run_id, Some(entity), &err);
                return Err(err);
            }

            tracing::info!(
                "Processing entity {} ({}) [{}/{}]",
                entity.id,
                entity.entity_type,
                index + 1,
                total
            );

            self.ledger.open(run_id, entity, &current_input).await?;

            let instructions = overrides.and_then(|o| o.for_entity(entity));
            let step = match self
                .run_step(entity, &current_input, instructions.as_deref())
                .await
            {
                Ok(output) => self
                    .ledger
                    .close(run_id, entity, RunStatus::Completed, &output)
                    .await
                    .map(|_| output),
                Err(err) => Err(err),
            };
            match step {
                Ok(output) => {
                    self.publish_run_update(workflow_id, run_id, entity, RunStatus::Completed, index, total);
                    current_input = output;
                }
                Err(err) => {
                    tracing::error!("Error processing entity {}: {}", entity.id, err);
                    self.record_failure(run_id, entity, &err).await;
                    self.publish_run_update(workflow_id, run_id, entity, RunStatus::Failed, index, total);
                    self.publish_chain_failed(workflow_id, run_id, Some(entity), &err);
                    return Err(err);
                }
            }
        }

        tracing::info!("Workflow processing completed successfully (run {})", run_id);
        self.event_bus.publish(
            CHAIN_COMPLETED,
            serde_json::json!({
                "runId": run_id,
                "workflowId": workflow_id,
                "steps": total,
            }),
        );
        Ok(current_input)
    }

    async fn run_step(
        &self,
        entity: &WorkflowEntity,
        input_text: &str,
        instructions: Option<&str>,
    ) -> Result<String, ServerError> {
        let step = self.executor.run(entity, input_text, instructions);
        match self.step_timeout {
            Some(limit) => tokio::time::timeout(limit, step)
                .await
                .map_err(|_| ServerError::Timeout(limit.as_secs()))?,
            None => step.await,
        }
    }

    /// Best effort: a storage error here is logged and the step's own
    /// error is what the caller sees.
    async fn record_failure(&self, run_id: &str, entity: &WorkflowEntity, err: &ServerError) {
        let message = format!("Error: {}", err);
        if let Err(record_err) = self
            .ledger
            .close(run_id, entity, RunStatus::Failed, &message)
            .await
        {
            tracing::error!(
                "Could not update run status after error (run {}, entity {}): {}",
                run_id,
                entity.id,
                record_err
            );
        }
    }

    fn publish_run_update(
        &self,
        workflow_id: &str,
        run_id: &str,
        entity: &WorkflowEntity,
        status: RunStatus,
        index: usize,
        total: usize,
    ) {
        self.event_bus.publish(
            RUN_UPDATE,
            serde_json::json!({
                "runId": run_id,
                "workflowId": workflow_id,
                "entityId": entity.id,
                "externalId": entity.external_id,
                "status": status,
                "step": index + 1,
                "total": total,
            }),
        );
    }

    fn publish_chain_failed(
        &self,
        workflow_id: &str,
        run_id: &str,
        entity: Option<&WorkflowEntity>,
        err: &ServerError,
    ) {
        self.event_bus.publish(
            CHAIN_FAILED,
            serde_json::json!({
                "runId": run_id,
                "workflowId": workflow_id,
                "entityId": entity.map(|e| e.id.clone()),
                "error": err.to_string(),
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::generation::Generator;
    use crate::store::RunStore;
    use crate::testing::{seed_workflow, ScriptedGenerator};

    fn orchestrator(db: &Database, generator: Arc<dyn Generator>, bus: EventBus) -> ChainOrchestrator {
        ChainOrchestrator::new(
            WorkflowStore::new(db.clone()),
            EntityStore::new(db.clone()),
            RunLedger::new(RunStore::new(db.clone())),
            StepExecutor::new(generator, bus.clone()),
            bus,
        )
    }

    #[tokio::test]
    async fn test_story_scenario_chains_outputs() {
        let db = Database::open_in_memory().unwrap();
        let (wf, entities) = seed_workflow(&db, &[("lead", 1.0), ("dialogue", 2.0)]).await;
        let chain = orchestrator(&db, Arc::new(ScriptedGenerator::default()), EventBus::new());

        let output = chain.execute(&wf.id, "run-1", "start", None).await.unwrap();

        let f_a = "Narrative Lead Agent(start)";
        let f_b = format!("Dialogue Writer Agent({})", f_a);
        assert_eq!(output, f_b);

        let runs = chain.ledger().status("run-1").await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].entity_id, entities[0].id);
        assert_eq!(runs[0].input_text, "start");
        assert_eq!(runs[0].output_text, f_a);
        assert_eq!(runs[0].status, RunStatus::Completed);
        assert_eq!(runs[1].entity_id, entities[1].id);
        assert_eq!(runs[1].input_text, f_a);
        assert_eq!(runs[1].output_text, f_b);
        assert_eq!(runs[1].status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_entities_run_by_order_then_insertion() {
        let db = Database::open_in_memory().unwrap();
        // Inserted critic(3), lore(1), art(1): expected lore, art, critic.
        let (wf, entities) = seed_workflow(&db, &[("critic", 3.0), ("lore", 1.0), ("art", 1.0)]).await;
        let generator = Arc::new(ScriptedGenerator::default());
        let chain = orchestrator(&db, generator.clone(), EventBus::new());

        chain.execute(&wf.id, "run-1", "seed", None).await.unwrap();

        let names: Vec<String> = generator.calls().into_iter().map(|c| c.name).collect();
        assert_eq!(
            names,
            vec!["Lore Master Agent", "Art Style Director Agent", "Critic Agent"]
        );
        let runs = chain.ledger().status("run-1").await.unwrap();
        let order: Vec<&str> = runs.iter().map(|r| r.entity_id.as_str()).collect();
        assert_eq!(
            order,
            vec![entities[1].id.as_str(), entities[2].id.as_str(), entities[0].id.as_str()]
        );
    }

    #[tokio::test]
    async fn test_failure_aborts_remaining_entities() {
        let db = Database::open_in_memory().unwrap();
        let (wf, entities) =
            seed_workflow(&db, &[("lead", 1.0), ("dialogue", 2.0), ("critic", 3.0), ("reporter", 4.0)]).await;
        let generator = Arc::new(ScriptedGenerator::failing_for(&["Critic Agent"]));
        let chain = orchestrator(&db, generator.clone(), EventBus::new());

        let err = chain.execute(&wf.id, "run-1", "start", None).await.unwrap_err();
        assert!(matches!(err, ServerError::Generation(_)));

        let runs = chain.ledger().status("run-1").await.unwrap();
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[0].status, RunStatus::Completed);
        assert_eq!(runs[1].status, RunStatus::Completed);
        assert_eq!(runs[2].status, RunStatus::Failed);
        assert!(runs[2].output_text.starts_with("Error: "));
        assert!(runs[2].output_text.contains("Critic Agent is unavailable"));
        assert!(runs.iter().all(|r| r.entity_id != entities[3].id));
        assert_eq!(generator.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_retrigger_same_run_id_reuses_rows() {
        let db = Database::open_in_memory().unwrap();
        let (wf, _) = seed_workflow(&db, &[("lead", 1.0), ("dialogue", 2.0)]).await;

        let failing = orchestrator(
            &db,
            Arc::new(ScriptedGenerator::failing_for(&["Dialogue Writer Agent"])),
            EventBus::new(),
        );
        assert!(failing.execute(&wf.id, "run-1", "start", None).await.is_err());

        let healthy = orchestrator(&db, Arc::new(ScriptedGenerator::default()), EventBus::new());
        healthy.execute(&wf.id, "run-1", "again", None).await.unwrap();

        let runs = healthy.ledger().status("run-1").await.unwrap();
        assert_eq!(runs.len(), 2);
        assert!(runs.iter().all(|r| r.status == RunStatus::Completed));
        assert_eq!(runs[0].input_text, "again");
    }

    #[tokio::test]
    async fn test_preconditions_fail_before_any_run() {
        let db = Database::open_in_memory().unwrap();
        let (wf, _) = seed_workflow(&db, &[]).await;
        let chain = orchestrator(&db, Arc::new(ScriptedGenerator::default()), EventBus::new());

        let err = chain.execute(&wf.id, "run-1", "start", None).await.unwrap_err();
        assert!(matches!(err, ServerError::EmptyWorkflow(ref name) if name == "Story"));

        let err = chain.execute("missing", "run-2", "start", None).await.unwrap_err();
        assert!(matches!(err, ServerError::NotFound(_)));

        assert!(chain.ledger().list_for_workflow(&wf.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_overrides_take_precedence() {
        let db = Database::open_in_memory().unwrap();
        let (wf, _) = seed_workflow(&db, &[("lead", 1.0), ("lore", 2.0)]).await;
        let generator = Arc::new(ScriptedGenerator::default());
        let chain = orchestrator(&db, generator.clone(), EventBus::new());

        let overrides: InstructionOverrides =
            serde_json::from_value(serde_json::json!({ "node-1": "Check the canon." })).unwrap();
        chain.execute(&wf.id, "run-1", "start", Some(&overrides)).await.unwrap();

        let calls = generator.calls();
        assert_eq!(
            calls[0].instructions,
            "You are the narrative lead who develops the overarching story."
        );
        assert_eq!(calls[1].instructions, "Check the canon.");
    }

    #[tokio::test]
    async fn test_step_timeout_marks_run_failed() {
        let db = Database::open_in_memory().unwrap();
        let (wf, _) = seed_workflow(&db, &[("lead", 1.0), ("dialogue", 2.0)]).await;
        let generator = Arc::new(ScriptedGenerator {
            delay: Some(Duration::from_millis(500)),
            ..ScriptedGenerator::default()
        });
        let chain = orchestrator(&db, generator, EventBus::new())
            .with_step_timeout(Some(Duration::from_millis(20)));

        let err = chain.execute(&wf.id, "run-1", "start", None).await.unwrap_err();
        assert!(matches!(err, ServerError::Timeout(_)));

        let runs = chain.ledger().status("run-1").await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn test_cancel_stops_between_steps() {
        let db = Database::open_in_memory().unwrap();
        let (wf, _) = seed_workflow(&db, &[("lead", 1.0)]).await;
        let chain = orchestrator(&db, Arc::new(ScriptedGenerator::default()), EventBus::new());

        let cancel = CancelHandle::new();
        cancel.cancel();
        let err = chain
            .execute_with_cancel(&wf.id, "run-1", "start", None, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Cancelled(_)));
        assert!(chain.ledger().list_for_workflow(&wf.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_start_failure_carries_run_id() {
        let db = Database::open_in_memory().unwrap();
        let (wf, _) = seed_workflow(&db, &[("lead", 1.0), ("critic", 2.0)]).await;
        let chain = orchestrator(
            &db,
            Arc::new(ScriptedGenerator::failing_for(&["Critic Agent"])),
            EventBus::new(),
        );

        let failure = chain.start(&wf.id, "start", None).await.unwrap_err();
        assert!(matches!(failure.source, ServerError::Generation(_)));

        let runs = chain.ledger().status(&failure.run_id).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].status, RunStatus::Completed);
        assert_eq!(runs[1].status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn test_failed_completion_write_marks_run_failed() {
        let db = Database::open_in_memory().unwrap();
        let (wf, _) = seed_workflow(&db, &[("lead", 1.0), ("dialogue", 2.0)]).await;
        db.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER reject_completed BEFORE UPDATE OF status ON runs
                 WHEN NEW.status = 'completed'
                 BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
            )
        })
        .unwrap();
        let generator = Arc::new(ScriptedGenerator::default());
        let chain = orchestrator(&db, generator.clone(), EventBus::new());

        let err = chain.execute(&wf.id, "run-1", "start", None).await.unwrap_err();
        assert!(matches!(err, ServerError::Database(_)));

        let runs = chain.ledger().status("run-1").await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Failed);
        assert!(runs[0].output_text.contains("disk full"));
        assert_eq!(generator.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_structured_output_is_stored_as_json_text() {
        let db = Database::open_in_memory().unwrap();
        let (wf, _) = seed_workflow(&db, &[("lead", 1.0), ("dialogue", 2.0)]).await;
        let generator = Arc::new(ScriptedGenerator {
            structured: true,
            ..ScriptedGenerator::default()
        });
        let chain = orchestrator(&db, generator.clone(), EventBus::new());

        let output = chain.execute(&wf.id, "run-1", "start", None).await.unwrap();

        let first = r#"{"text":"Narrative Lead Agent(start)"}"#;
        let runs = chain.ledger().status("run-1").await.unwrap();
        assert_eq!(runs[0].output_text, first);
        assert_eq!(runs[1].input_text, first);
        assert_eq!(generator.calls()[1].input_text, first);

        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(
            parsed["text"],
            format!("Dialogue Writer Agent({})", first).as_str()
        );
    }

    #[tokio::test]
    async fn test_events_follow_chain_progress() {
        let db = Database::open_in_memory().unwrap();
        let (wf, _) = seed_workflow(&db, &[("lead", 1.0), ("dialogue", 2.0)]).await;
        let bus = EventBus::new();
        let mut sub = bus.subscribe("watcher");
        let chain = orchestrator(&db, Arc::new(ScriptedGenerator::default()), bus.clone());

        let outcome = chain.start(&wf.id, "start", None).await.unwrap();
        assert_eq!(outcome.runs.len(), 2);

        let mut names = Vec::new();
        while let Some(event) = sub.try_next() {
            names.push(event.event);
        }
        assert_eq!(
            names,
            vec![
                "connected",
                "agent-response",
                "run-update",
                "agent-response",
                "run-update",
                "chain-completed",
            ]
        );
    }

    #[tokio::test]
    async fn test_concurrent_runs_do_not_interfere() {
        let db = Database::open_in_memory().unwrap();
        let (wf, _) = seed_workflow(&db, &[("lead", 1.0), ("dialogue", 2.0)]).await;
        let chain = orchestrator(&db, Arc::new(ScriptedGenerator::default()), EventBus::new());

        let (a, b) = tokio::join!(
            chain.execute(&wf.id, "run-a", "alpha", None),
            chain.execute(&wf.id, "run-b", "beta", None),
        );
        assert!(a.unwrap().contains("alpha"));
        assert!(b.unwrap().contains("beta"));

        let all = chain.ledger().list_for_workflow(&wf.id).await.unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(chain.ledger().status("run-a").await.unwrap()[0].input_text, "alpha");
        assert_eq!(chain.ledger().status("run-b").await.unwrap()[0].input_text, "beta");
    }
}
