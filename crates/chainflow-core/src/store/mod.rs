pub mod entity_store;
pub mod project_store;
pub mod run_store;
pub mod workflow_store;

pub use entity_store::EntityStore;
pub use project_store::ProjectStore;
pub use run_store::RunStore;
pub use workflow_store::WorkflowStore;

use chrono::{DateTime, Utc};

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
}
