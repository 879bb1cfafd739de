//! Run records: lifecycle of per-entity runs within one execution.
//!
//! `open` and `close` are separate units of work. `close` re-reads the row
//! in a fresh transaction before writing the final status, so a failure
//! recorded after an aborted step still lands.

use crate::error::ServerError;
use crate::models::entity::WorkflowEntity;
use crate::models::run::{Run, RunStatus};
use crate::store::RunStore;

#[derive(Clone)]
pub struct RunLedger {
    runs: RunStore,
}

impl RunLedger {
    pub fn new(runs: RunStore) -> Self {
        Self { runs }
    }

    /// Mark `entity` as processing within `run_id`, reusing an earlier
    /// attempt's row when there is one.
    pub async fn open(
        &self,
        run_id: &str,
        entity: &WorkflowEntity,
        input_text: &str,
    ) -> Result<Run, ServerError> {
        let run = Run::processing(
            run_id.to_string(),
            entity.workflow_id.clone(),
            entity.id.clone(),
            input_text.to_string(),
        );
        let stored = self.runs.upsert_processing(&run).await?;
        tracing::debug!(
            "[RunLedger] run={} entity={} -> processing",
            run_id,
            entity.id
        );
        Ok(stored)
    }

    /// Record the final state of `entity` within `run_id`.
    pub async fn close(
        &self,
        run_id: &str,
        entity: &WorkflowEntity,
        status: RunStatus,
        output_text: &str,
    ) -> Result<Run, ServerError> {
        if !status.is_terminal() {
            return Err(ServerError::BadRequest(format!(
                "Cannot close run with non-final status '{}'",
                status
            )));
        }

        let run = self
            .runs
            .finalize(run_id, &entity.id, status, output_text)
            .await?
            .ok_or_else(|| {
                ServerError::NotFound(format!(
                    "Run not found for run_id={} and entity_id={}",
                    run_id, entity.id
                ))
            })?;
        tracing::debug!("[RunLedger] run={} entity={} -> {}", run_id, entity.id, status);
        Ok(run)
    }

    /// Per-entity runs of one execution instance.
    pub async fn status(&self, run_id: &str) -> Result<Vec<Run>, ServerError> {
        let runs = self.runs.list_by_run(run_id).await?;
        if runs.is_empty() {
            return Err(ServerError::NotFound(format!("Run {} not found", run_id)));
        }
        Ok(runs)
    }

    pub async fn entity_status(&self, run_id: &str, entity_id: &str) -> Result<Run, ServerError> {
        self.runs.get(run_id, entity_id).await?.ok_or_else(|| {
            ServerError::NotFound(format!(
                "Run not found for run_id={} and entity_id={}",
                run_id, entity_id
            ))
        })
    }

    pub async fn list_for_workflow(&self, workflow_id: &str) -> Result<Vec<Run>, ServerError> {
        self.runs.list_by_workflow(workflow_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::testing::seed_workflow;

    #[tokio::test]
    async fn test_open_reuses_existing_row() {
        let db = Database::open_in_memory().unwrap();
        let (_, entities) = seed_workflow(&db, &[("lead", 1.0)]).await;
        let ledger = RunLedger::new(RunStore::new(db.clone()));
        let entity = &entities[0];

        ledger.open("run-1", entity, "first").await.unwrap();
        ledger
            .close("run-1", entity, RunStatus::Failed, "Error: boom")
            .await
            .unwrap();
        let reopened = ledger.open("run-1", entity, "second").await.unwrap();

        assert_eq!(reopened.status, RunStatus::Processing);
        assert_eq!(reopened.input_text, "second");
        let all = ledger.status("run-1").await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_close_lands_after_rolled_back_transaction() {
        let db = Database::open_in_memory().unwrap();
        let (_, entities) = seed_workflow(&db, &[("lead", 1.0)]).await;
        let ledger = RunLedger::new(RunStore::new(db.clone()));
        let entity = entities[0].clone();

        ledger.open("run-1", &entity, "input").await.unwrap();

        // A unit of work touching the same row that aborts half way.
        let entity_id = entity.id.clone();
        let aborted: Result<(), ServerError> = db.with_transaction(move |tx| {
            tx.execute(
                "UPDATE runs SET output_text = 'partial' WHERE id = 'run-1' AND workflow_entity_id = ?1",
                rusqlite::params![entity_id],
            )?;
            Err(rusqlite::Error::InvalidQuery)
        });
        assert!(aborted.is_err());

        let closed = ledger
            .close("run-1", &entity, RunStatus::Failed, "Error: step crashed")
            .await
            .unwrap();
        assert_eq!(closed.status, RunStatus::Failed);

        let stored = ledger.entity_status("run-1", &entity.id).await.unwrap();
        assert_eq!(stored.status, RunStatus::Failed);
        assert_eq!(stored.output_text, "Error: step crashed");
    }

    #[tokio::test]
    async fn test_close_requires_final_status_and_existing_row() {
        let db = Database::open_in_memory().unwrap();
        let (_, entities) = seed_workflow(&db, &[("lead", 1.0)]).await;
        let ledger = RunLedger::new(RunStore::new(db));

        let err = ledger
            .close("missing", &entities[0], RunStatus::Completed, "x")
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::NotFound(_)));

        let err = ledger
            .close("missing", &entities[0], RunStatus::Processing, "x")
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_status_of_unknown_run_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let ledger = RunLedger::new(RunStore::new(db));
        assert!(matches!(
            ledger.status("nope").await,
            Err(ServerError::NotFound(_))
        ));
    }
}
