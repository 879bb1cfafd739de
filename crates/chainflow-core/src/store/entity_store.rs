use rusqlite::OptionalExtension;

use crate::db::Database;
use crate::error::ServerError;
use crate::models::entity::{ConnectionSpec, EntityConnection, WorkflowEntity};
use crate::store::from_millis;

const ENTITY_COLUMNS: &str = "id, external_id, type, label, prompt, data, sort_order, workflow_id, created_at, updated_at";

#[derive(Clone)]
pub struct EntityStore {
    db: Database,
}

impl EntityStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert an entity together with its outgoing connections.
    ///
    /// Connection targets are resolved by `external_id` within the same
    /// workflow; targets that do not exist yet are skipped. Returns the
    /// connections that were actually stored.
    pub async fn create(
        &self,
        entity: &WorkflowEntity,
        connections: &[ConnectionSpec],
    ) -> Result<Vec<EntityConnection>, ServerError> {
        if self
            .get_by_external_id(&entity.workflow_id, &entity.external_id)
            .await?
            .is_some()
        {
            return Err(ServerError::Conflict(format!(
                "Entity '{}' already exists in workflow {}",
                entity.external_id, entity.workflow_id
            )));
        }

        let e = entity.clone();
        let specs = connections.to_vec();
        self.db
            .with_transaction_async(move |tx| {
                tx.execute(
                    "INSERT INTO workflow_entities (id, external_id, type, label, prompt, data, sort_order,
                     workflow_id, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    rusqlite::params![
                        e.id,
                        e.external_id,
                        e.entity_type,
                        e.label,
                        e.prompt,
                        e.data.as_ref().map(|v| v.to_string()),
                        e.order,
                        e.workflow_id,
                        e.created_at.timestamp_millis(),
                        e.updated_at.timestamp_millis(),
                    ],
                )?;

                let mut stored = Vec::new();
                for spec in specs {
                    let target: Option<String> = tx
                        .query_row(
                            "SELECT id FROM workflow_entities WHERE workflow_id = ?1 AND external_id = ?2",
                            rusqlite::params![e.workflow_id, spec.target_id],
                            |row| row.get(0),
                        )
                        .optional()?;
                    let Some(target_id) = target else {
                        tracing::debug!(
                            "Skipping connection {} -> {}: target not found",
                            e.external_id,
                            spec.target_id
                        );
                        continue;
                    };

                    let connection = EntityConnection {
                        id: uuid::Uuid::new_v4().to_string(),
                        source_id: e.id.clone(),
                        target_id,
                        workflow_id: e.workflow_id.clone(),
                        label: spec.label,
                        style: spec.style,
                        animated: spec.animated,
                    };
                    tx.execute(
                        "INSERT INTO workflow_connections (id, source_id, target_id, workflow_id, label, style, animated)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                        rusqlite::params![
                            connection.id,
                            connection.source_id,
                            connection.target_id,
                            connection.workflow_id,
                            connection.label,
                            connection.style.as_ref().map(|v| v.to_string()),
                            connection.animated,
                        ],
                    )?;
                    stored.push(connection);
                }
                Ok(stored)
            })
            .await
    }

    pub async fn get(&self, id: &str) -> Result<Option<WorkflowEntity>, ServerError> {
        let id = id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM workflow_entities WHERE id = ?1",
                    ENTITY_COLUMNS
                ))?;
                stmt.query_row(rusqlite::params![id], |row| Ok(row_to_entity(row)))
                    .optional()
            })
            .await
    }

    pub async fn get_by_external_id(
        &self,
        workflow_id: &str,
        external_id: &str,
    ) -> Result<Option<WorkflowEntity>, ServerError> {
        let wf_id = workflow_id.to_string();
        let ext_id = external_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM workflow_entities WHERE workflow_id = ?1 AND external_id = ?2",
                    ENTITY_COLUMNS
                ))?;
                stmt.query_row(rusqlite::params![wf_id, ext_id], |row| Ok(row_to_entity(row)))
                    .optional()
            })
            .await
    }

    /// Entities of a workflow in execution order: `order` ascending, then
    /// insertion order.
    pub async fn list_by_workflow(&self, workflow_id: &str) -> Result<Vec<WorkflowEntity>, ServerError> {
        let wf_id = workflow_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM workflow_entities WHERE workflow_id = ?1
                     ORDER BY sort_order ASC, rowid ASC",
                    ENTITY_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![wf_id], |row| Ok(row_to_entity(row)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    pub async fn list_connections(&self, workflow_id: &str) -> Result<Vec<EntityConnection>, ServerError> {
        let wf_id = workflow_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, source_id, target_id, workflow_id, label, style, animated
                     FROM workflow_connections WHERE workflow_id = ?1 ORDER BY rowid ASC",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![wf_id], |row| Ok(row_to_connection(row)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    /// Add a connection from an existing entity. Returns `None` when the
    /// target `external_id` is unknown in that workflow.
    pub async fn connect(
        &self,
        source: &WorkflowEntity,
        spec: &ConnectionSpec,
    ) -> Result<Option<EntityConnection>, ServerError> {
        let Some(target) = self
            .get_by_external_id(&source.workflow_id, &spec.target_id)
            .await?
        else {
            tracing::debug!(
                "Skipping connection {} -> {}: target not found",
                source.external_id,
                spec.target_id
            );
            return Ok(None);
        };

        let connection = EntityConnection {
            id: uuid::Uuid::new_v4().to_string(),
            source_id: source.id.clone(),
            target_id: target.id,
            workflow_id: source.workflow_id.clone(),
            label: spec.label.clone(),
            style: spec.style.clone(),
            animated: spec.animated,
        };
        let c = connection.clone();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO workflow_connections (id, source_id, target_id, workflow_id, label, style, animated)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    rusqlite::params![
                        c.id,
                        c.source_id,
                        c.target_id,
                        c.workflow_id,
                        c.label,
                        c.style.as_ref().map(|v| v.to_string()),
                        c.animated,
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(Some(connection))
    }

    /// Delete an entity. Its connections and runs go with it.
    pub async fn delete(&self, id: &str) -> Result<bool, ServerError> {
        let id = id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let n = conn.execute(
                    "DELETE FROM workflow_entities WHERE id = ?1",
                    rusqlite::params![id],
                )?;
                Ok(n > 0)
            })
            .await
    }
}

use rusqlite::Row;

/// Convert a database row to a WorkflowEntity.
/// Column order: id(0), external_id(1), type(2), label(3), prompt(4), data(5),
///               sort_order(6), workflow_id(7), created_at(8), updated_at(9)
fn row_to_entity(row: &Row<'_>) -> WorkflowEntity {
    let data = row
        .get::<_, Option<String>>(5)
        .unwrap_or(None)
        .and_then(|s| serde_json::from_str(&s).ok());

    WorkflowEntity {
        id: row.get(0).unwrap_or_default(),
        external_id: row.get(1).unwrap_or_default(),
        entity_type: row.get(2).unwrap_or_default(),
        label: row.get(3).unwrap_or(None),
        prompt: row.get(4).unwrap_or(None),
        data,
        order: row.get(6).unwrap_or(0.0),
        workflow_id: row.get(7).unwrap_or_default(),
        created_at: from_millis(row.get(8).unwrap_or(0)),
        updated_at: from_millis(row.get(9).unwrap_or(0)),
    }
}

fn row_to_connection(row: &Row<'_>) -> EntityConnection {
    EntityConnection {
        id: row.get(0).unwrap_or_default(),
        source_id: row.get(1).unwrap_or_default(),
        target_id: row.get(2).unwrap_or_default(),
        workflow_id: row.get(3).unwrap_or_default(),
        label: row.get(4).unwrap_or(None),
        style: row
            .get::<_, Option<String>>(5)
            .unwrap_or(None)
            .and_then(|s| serde_json::from_str(&s).ok()),
        animated: row.get(6).unwrap_or(true),
    }
}
