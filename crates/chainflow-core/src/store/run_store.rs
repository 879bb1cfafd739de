use rusqlite::OptionalExtension;

use crate::db::Database;
use crate::error::ServerError;
use crate::models::run::{Run, RunStatus};
use crate::store::from_millis;

const RUN_COLUMNS: &str =
    "id, workflow_id, workflow_entity_id, input_text, output_text, status, created_at";

/// Persistence for per-entity run records.
///
/// Every mutating method runs in its own transaction and is durable once it
/// returns.
#[derive(Clone)]
pub struct RunStore {
    db: Database,
}

impl RunStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Mark `(run.id, run.entity_id)` as processing with `run.input_text`.
    ///
    /// An existing row for the pair is reused (input replaced, status reset);
    /// otherwise `run` is inserted. Returns the stored row.
    pub async fn upsert_processing(&self, run: &Run) -> Result<Run, ServerError> {
        let r = run.clone();
        self.db
            .with_transaction_async(move |tx| {
                let existing = select_run(tx, &r.id, &r.entity_id)?;
                match existing {
                    Some(mut row) => {
                        tx.execute(
                            "UPDATE runs SET status = ?1, input_text = ?2
                             WHERE id = ?3 AND workflow_entity_id = ?4",
                            rusqlite::params![
                                RunStatus::Processing.as_str(),
                                r.input_text,
                                r.id,
                                r.entity_id,
                            ],
                        )?;
                        row.status = RunStatus::Processing;
                        row.input_text = r.input_text;
                        Ok(row)
                    }
                    None => {
                        tx.execute(
                            "INSERT INTO runs (id, workflow_id, workflow_entity_id, input_text, output_text, status, created_at)
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                            rusqlite::params![
                                r.id,
                                r.workflow_id,
                                r.entity_id,
                                r.input_text,
                                r.output_text,
                                RunStatus::Processing.as_str(),
                                r.created_at.timestamp_millis(),
                            ],
                        )?;
                        Ok(Run {
                            status: RunStatus::Processing,
                            ..r
                        })
                    }
                }
            })
            .await
    }

    /// Write a final status and output for `(run_id, entity_id)`.
    ///
    /// The row is read again inside a fresh transaction before it is
    /// updated, so this is safe to call after an earlier unit of work on the
    /// same row was rolled back. Returns `None` when the row does not exist.
    pub async fn finalize(
        &self,
        run_id: &str,
        entity_id: &str,
        status: RunStatus,
        output_text: &str,
    ) -> Result<Option<Run>, ServerError> {
        let run_id = run_id.to_string();
        let entity_id = entity_id.to_string();
        let output_text = output_text.to_string();
        self.db
            .with_transaction_async(move |tx| {
                let Some(mut row) = select_run(tx, &run_id, &entity_id)? else {
                    return Ok(None);
                };
                tx.execute(
                    "UPDATE runs SET status = ?1, output_text = ?2
                     WHERE id = ?3 AND workflow_entity_id = ?4",
                    rusqlite::params![status.as_str(), output_text, run_id, entity_id],
                )?;
                row.status = status;
                row.output_text = output_text;
                Ok(Some(row))
            })
            .await
    }

    pub async fn get(&self, run_id: &str, entity_id: &str) -> Result<Option<Run>, ServerError> {
        let run_id = run_id.to_string();
        let entity_id = entity_id.to_string();
        self.db
            .with_conn_async(move |conn| select_run(conn, &run_id, &entity_id))
            .await
    }

    /// All entity runs of one execution instance, in creation order.
    pub async fn list_by_run(&self, run_id: &str) -> Result<Vec<Run>, ServerError> {
        let run_id = run_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM runs WHERE id = ?1 ORDER BY rowid ASC",
                    RUN_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![run_id], |row| Ok(row_to_run(row)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    pub async fn list_by_workflow(&self, workflow_id: &str) -> Result<Vec<Run>, ServerError> {
        let wf_id = workflow_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM runs WHERE workflow_id = ?1 ORDER BY rowid ASC",
                    RUN_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![wf_id], |row| Ok(row_to_run(row)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }
}

fn select_run(
    conn: &rusqlite::Connection,
    run_id: &str,
    entity_id: &str,
) -> Result<Option<Run>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM runs WHERE id = ?1 AND workflow_entity_id = ?2",
        RUN_COLUMNS
    ))?;
    stmt.query_row(rusqlite::params![run_id, entity_id], |row| Ok(row_to_run(row)))
        .optional()
}

use rusqlite::Row;

fn row_to_run(row: &Row<'_>) -> Run {
    Run {
        id: row.get(0).unwrap_or_default(),
        workflow_id: row.get(1).unwrap_or_default(),
        entity_id: row.get(2).unwrap_or_default(),
        input_text: row.get(3).unwrap_or_default(),
        output_text: row.get(4).unwrap_or_default(),
        status: RunStatus::from_str(&row.get::<_, String>(5).unwrap_or_default())
            .unwrap_or(RunStatus::Pending),
        created_at: from_millis(row.get(6).unwrap_or(0)),
    }
}
