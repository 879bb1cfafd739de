//! Shared fixtures for unit tests.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::db::Database;
use crate::error::ServerError;
use crate::generation::{GenerationRequest, Generator};
use crate::models::{Project, Workflow, WorkflowEntity};
use crate::store::{EntityStore, ProjectStore, WorkflowStore};

/// Create a project, a workflow and one entity per `(type, order)` pair,
/// inserted in the given sequence. External ids are `node-0`, `node-1`, ...
pub async fn seed_workflow(db: &Database, entities: &[(&str, f64)]) -> (Workflow, Vec<WorkflowEntity>) {
    let project = Project::new("p-test".to_string(), "Test".to_string(), None);
    ProjectStore::new(db.clone()).save(&project).await.unwrap();

    let workflow = Workflow::new(
        uuid::Uuid::new_v4().to_string(),
        "Story".to_string(),
        "narrative".to_string(),
        None,
        project.id.clone(),
    );
    WorkflowStore::new(db.clone()).save(&workflow).await.unwrap();

    let store = EntityStore::new(db.clone());
    let mut created = Vec::new();
    for (i, (entity_type, order)) in entities.iter().enumerate() {
        let entity = WorkflowEntity::new(
            uuid::Uuid::new_v4().to_string(),
            workflow.id.clone(),
            format!("node-{}", i),
            entity_type.to_string(),
            *order,
        );
        store.create(&entity, &[]).await.unwrap();
        created.push(entity);
    }
    (workflow, created)
}

/// Deterministic generator: answers `"<name>(<input>)"`, or fails for
/// agents whose name is listed in `fail_for`.
#[derive(Default)]
pub struct ScriptedGenerator {
    pub fail_for: Vec<String>,
    pub delay: Option<Duration>,
    pub structured: bool,
    pub calls: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn failing_for(names: &[&str]) -> Self {
        Self {
            fail_for: names.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<GenerationRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<serde_json::Value, ServerError> {
        self.calls.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_for.iter().any(|n| n == &request.name) {
            return Err(ServerError::Generation(format!("{} is unavailable", request.name)));
        }
        let text = format!("{}({})", request.name, request.input_text);
        if self.structured {
            Ok(serde_json::json!({ "text": text }))
        } else {
            Ok(serde_json::Value::String(text))
        }
    }
}
