//! SQLite database layer for Chainflow.
//!
//! Uses rusqlite with WAL mode for concurrent read performance.
//! All database operations are executed via `tokio::task::spawn_blocking`
//! to avoid blocking the async runtime.
//!
//! Every call to [`Database::with_transaction`] is its own unit of work:
//! it commits when the closure returns `Ok` and rolls back otherwise. The
//! chain engine relies on this to keep each run-state write independently
//! durable.

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::ServerError;

/// Thread-safe handle to the SQLite database.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) a SQLite database at the given path.
    pub fn open(db_path: &str) -> Result<Self, ServerError> {
        let path = Path::new(db_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let conn = Connection::open(db_path)
            .map_err(|e| ServerError::Database(format!("Failed to open database: {}", e)))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| ServerError::Database(format!("Failed to set pragmas: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_tables()?;

        tracing::info!("SQLite database opened at: {}", db_path);
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, ServerError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ServerError::Database(format!("Failed to open in-memory db: {}", e)))?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| ServerError::Database(format!("Failed to set pragmas: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_tables()?;
        Ok(db)
    }

    /// Execute a closure with access to the database connection.
    /// Automatically handles locking and error conversion.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, ServerError>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ServerError::Database(format!("Lock poisoned: {}", e)))?;
        f(&conn).map_err(|e| ServerError::Database(e.to_string()))
    }

    /// Execute a closure with access to the database connection (async-friendly).
    pub async fn with_conn_async<F, T>(&self, f: F) -> Result<T, ServerError>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.with_conn(f))
            .await
            .map_err(|e| ServerError::Database(format!("Task join error: {}", e)))?
    }

    /// Run a closure inside a dedicated transaction.
    ///
    /// The transaction commits when the closure succeeds and is rolled back
    /// when it fails. The connection lock is held only for the duration of
    /// the closure.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, ServerError>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T, rusqlite::Error>,
    {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let value = f(&tx)?;
            tx.commit()?;
            Ok(value)
        })
    }

    /// Async-friendly variant of [`Database::with_transaction`].
    pub async fn with_transaction_async<F, T>(&self, f: F) -> Result<T, ServerError>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T, rusqlite::Error> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.with_transaction(f))
            .await
            .map_err(|e| ServerError::Database(format!("Task join error: {}", e)))?
    }

    /// Cheap liveness probe used by the health endpoint.
    pub async fn ping(&self) -> Result<(), ServerError> {
        self.with_conn_async(|conn| conn.query_row("SELECT 1", [], |_| Ok(())))
            .await
    }

    /// Create all tables if they don't exist.
    fn initialize_tables(&self) -> Result<(), ServerError> {
        self.with_conn(|conn| {
            conn.execute_batch(
                "
                CREATE TABLE IF NOT EXISTS projects (
                    id              TEXT PRIMARY KEY,
                    name            TEXT NOT NULL,
                    description     TEXT,
                    created_at      INTEGER NOT NULL,
                    updated_at      INTEGER NOT NULL
                );

                CREATE TABLE IF NOT EXISTS workflows (
                    id              TEXT PRIMARY KEY,
                    name            TEXT NOT NULL,
                    type            TEXT NOT NULL,
                    description     TEXT,
                    project_id      TEXT NOT NULL REFERENCES projects(id),
                    created_at      INTEGER NOT NULL,
                    updated_at      INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_workflows_project ON workflows(project_id);

                CREATE TABLE IF NOT EXISTS workflow_entities (
                    id              TEXT PRIMARY KEY,
                    external_id     TEXT NOT NULL,
                    type            TEXT NOT NULL,
                    label           TEXT,
                    prompt          TEXT,
                    data            TEXT,
                    sort_order      REAL NOT NULL DEFAULT 0,
                    workflow_id     TEXT NOT NULL REFERENCES workflows(id) ON DELETE CASCADE,
                    created_at      INTEGER NOT NULL,
                    updated_at      INTEGER NOT NULL,
                    UNIQUE (workflow_id, external_id)
                );
                CREATE INDEX IF NOT EXISTS idx_entities_workflow ON workflow_entities(workflow_id);

                CREATE TABLE IF NOT EXISTS workflow_connections (
                    id              TEXT PRIMARY KEY,
                    source_id       TEXT NOT NULL REFERENCES workflow_entities(id) ON DELETE CASCADE,
                    target_id       TEXT NOT NULL REFERENCES workflow_entities(id) ON DELETE CASCADE,
                    workflow_id     TEXT NOT NULL REFERENCES workflows(id) ON DELETE CASCADE,
                    label           TEXT,
                    style           TEXT,
                    animated        INTEGER NOT NULL DEFAULT 1
                );
                CREATE INDEX IF NOT EXISTS idx_connections_workflow ON workflow_connections(workflow_id);

                CREATE TABLE IF NOT EXISTS runs (
                    id                  TEXT NOT NULL,
                    workflow_id         TEXT NOT NULL REFERENCES workflows(id) ON DELETE CASCADE,
                    workflow_entity_id  TEXT NOT NULL REFERENCES workflow_entities(id) ON DELETE CASCADE,
                    input_text          TEXT NOT NULL,
                    output_text         TEXT NOT NULL DEFAULT '',
                    status              TEXT NOT NULL DEFAULT 'pending',
                    created_at          INTEGER NOT NULL,
                    PRIMARY KEY (id, workflow_entity_id)
                );
                CREATE INDEX IF NOT EXISTS idx_runs_workflow ON runs(workflow_id);
                ",
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let db = Database::open_in_memory().unwrap();

        let result: Result<(), ServerError> = db.with_transaction(|tx| {
            tx.execute(
                "INSERT INTO projects (id, name, created_at, updated_at) VALUES ('p1', 'P', 0, 0)",
                [],
            )?;
            tx.execute("INSERT INTO no_such_table VALUES (1)", [])?;
            Ok(())
        });
        assert!(matches!(result, Err(ServerError::Database(_))));

        let count: i64 = db
            .with_conn(|conn| conn.query_row("SELECT COUNT(*) FROM projects", [], |r| r.get(0)))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_run_identity_is_unique_per_entity() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            conn.execute_batch(
                "INSERT INTO projects (id, name, created_at, updated_at) VALUES ('p', 'P', 0, 0);
                 INSERT INTO workflows (id, name, type, project_id, created_at, updated_at)
                   VALUES ('w', 'W', 'story', 'p', 0, 0);
                 INSERT INTO workflow_entities (id, external_id, type, workflow_id, created_at, updated_at)
                   VALUES ('e', 'node-1', 'lead', 'w', 0, 0);
                 INSERT INTO runs (id, workflow_id, workflow_entity_id, input_text, status, created_at)
                   VALUES ('r', 'w', 'e', 'x', 'processing', 0);",
            )
        })
        .unwrap();

        let dup = db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO runs (id, workflow_id, workflow_entity_id, input_text, status, created_at)
                 VALUES ('r', 'w', 'e', 'y', 'processing', 0)",
                [],
            )
        });
        assert!(dup.is_err());
    }

    #[test]
    fn test_committed_writes_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("chainflow.db");
        let path = path.to_str().unwrap();

        {
            let db = Database::open(path).unwrap();
            db.with_transaction(|tx| {
                tx.execute(
                    "INSERT INTO projects (id, name, created_at, updated_at) VALUES ('p1', 'P', 0, 0)",
                    [],
                )
            })
            .unwrap();
        }

        let reopened = Database::open(path).unwrap();
        let name: String = reopened
            .with_conn(|conn| conn.query_row("SELECT name FROM projects WHERE id = 'p1'", [], |r| r.get(0)))
            .unwrap();
        assert_eq!(name, "P");
    }
}
