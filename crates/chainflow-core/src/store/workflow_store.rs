use chrono::Utc;
use rusqlite::OptionalExtension;

use crate::db::Database;
use crate::error::ServerError;
use crate::models::workflow::Workflow;
use crate::store::from_millis;

#[derive(Clone)]
pub struct WorkflowStore {
    db: Database,
}

impl WorkflowStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn save(&self, workflow: &Workflow) -> Result<(), ServerError> {
        let wf = workflow.clone();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO workflows (id, name, type, description, project_id, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT(id) DO UPDATE SET
                       name = excluded.name,
                       type = excluded.type,
                       description = excluded.description,
                       project_id = excluded.project_id,
                       updated_at = excluded.updated_at",
                    rusqlite::params![
                        wf.id,
                        wf.name,
                        wf.workflow_type,
                        wf.description,
                        wf.project_id,
                        wf.created_at.timestamp_millis(),
                        wf.updated_at.timestamp_millis(),
                    ],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn get(&self, id: &str) -> Result<Option<Workflow>, ServerError> {
        let id = id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, type, description, project_id, created_at, updated_at
                     FROM workflows WHERE id = ?1",
                )?;
                stmt.query_row(rusqlite::params![id], |row| Ok(row_to_workflow(row)))
                    .optional()
            })
            .await
    }

    /// List workflows, optionally restricted to one project, with offset
    /// pagination.
    pub async fn list(
        &self,
        project_id: Option<&str>,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Workflow>, ServerError> {
        let project_id = project_id.map(|s| s.to_string());
        let skip = skip as i64;
        let limit = limit as i64;
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, type, description, project_id, created_at, updated_at
                     FROM workflows
                     WHERE (?1 IS NULL OR project_id = ?1)
                     ORDER BY created_at ASC, rowid ASC
                     LIMIT ?2 OFFSET ?3",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![project_id, limit, skip], |row| {
                        Ok(row_to_workflow(row))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    pub async fn update(
        &self,
        id: &str,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<(), ServerError> {
        let id = id.to_string();
        let name = name.map(|s| s.to_string());
        let description = description.map(|s| s.to_string());
        let now = Utc::now().timestamp_millis();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "UPDATE workflows SET
                       name = COALESCE(?1, name),
                       description = COALESCE(?2, description),
                       updated_at = ?3
                     WHERE id = ?4",
                    rusqlite::params![name, description, now, id],
                )?;
                Ok(())
            })
            .await
    }

    /// Delete a workflow. Entities, connections and runs go with it.
    /// Returns whether a row was removed.
    pub async fn delete(&self, id: &str) -> Result<bool, ServerError> {
        let id = id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let n = conn.execute("DELETE FROM workflows WHERE id = ?1", rusqlite::params![id])?;
                Ok(n > 0)
            })
            .await
    }
}

use rusqlite::Row;

fn row_to_workflow(row: &Row<'_>) -> Workflow {
    Workflow {
        id: row.get(0).unwrap_or_default(),
        name: row.get(1).unwrap_or_default(),
        workflow_type: row.get(2).unwrap_or_default(),
        description: row.get(3).unwrap_or(None),
        project_id: row.get(4).unwrap_or_default(),
        created_at: from_millis(row.get(5).unwrap_or(0)),
        updated_at: from_millis(row.get(6).unwrap_or(0)),
    }
}
