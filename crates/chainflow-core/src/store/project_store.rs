use rusqlite::OptionalExtension;

use crate::db::Database;
use crate::error::ServerError;
use crate::models::project::{Project, DEFAULT_PROJECT_ID};
use crate::store::from_millis;

#[derive(Clone)]
pub struct ProjectStore {
    db: Database,
}

impl ProjectStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn save(&self, project: &Project) -> Result<(), ServerError> {
        let p = project.clone();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO projects (id, name, description, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(id) DO UPDATE SET
                       name = excluded.name,
                       description = excluded.description,
                       updated_at = excluded.updated_at",
                    rusqlite::params![
                        p.id,
                        p.name,
                        p.description,
                        p.created_at.timestamp_millis(),
                        p.updated_at.timestamp_millis(),
                    ],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn get(&self, id: &str) -> Result<Option<Project>, ServerError> {
        let id = id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, description, created_at, updated_at
                     FROM projects WHERE id = ?1",
                )?;
                stmt.query_row(rusqlite::params![id], |row| Ok(row_to_project(row)))
                    .optional()
            })
            .await
    }

    pub async fn list(&self) -> Result<Vec<Project>, ServerError> {
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, description, created_at, updated_at
                     FROM projects ORDER BY created_at DESC",
                )?;
                let rows = stmt
                    .query_map([], |row| Ok(row_to_project(row)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    pub async fn ensure_default(&self) -> Result<Project, ServerError> {
        if let Some(project) = self.get(DEFAULT_PROJECT_ID).await? {
            return Ok(project);
        }
        let project = Project::new(
            DEFAULT_PROJECT_ID.to_string(),
            "Default Project".to_string(),
            None,
        );
        self.save(&project).await?;
        Ok(project)
    }
}

use rusqlite::Row;

fn row_to_project(row: &Row<'_>) -> Project {
    Project {
        id: row.get(0).unwrap_or_default(),
        name: row.get(1).unwrap_or_default(),
        description: row.get(2).unwrap_or(None),
        created_at: from_millis(row.get(3).unwrap_or(0)),
        updated_at: from_millis(row.get(4).unwrap_or(0)),
    }
}
