//! `chainflow entity` — Add entities to a workflow and remove them.

use chainflow_core::models::{ConnectionSpec, WorkflowEntity};
use chainflow_core::state::AppState;

use super::print_json;

/// Options for `chainflow entity add`.
#[derive(Debug, Default, Clone)]
pub struct AddEntity {
    pub workflow_id: String,
    pub external_id: String,
    pub entity_type: String,
    pub label: Option<String>,
    pub prompt: Option<String>,
    pub order: f64,
    /// External ids of entities this one connects to.
    pub connect: Vec<String>,
}

pub async fn add(state: &AppState, opts: AddEntity) -> Result<WorkflowEntity, String> {
    state
        .workflow_store
        .get(&opts.workflow_id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("Workflow {} not found", opts.workflow_id))?;

    let mut entity = WorkflowEntity::new(
        uuid::Uuid::new_v4().to_string(),
        opts.workflow_id,
        opts.external_id,
        opts.entity_type,
        opts.order,
    );
    entity.label = opts.label;
    entity.prompt = opts.prompt;

    let specs: Vec<ConnectionSpec> = opts
        .connect
        .into_iter()
        .map(|target_id| ConnectionSpec {
            target_id,
            label: None,
            style: None,
            animated: true,
        })
        .collect();

    let connections = state
        .entity_store
        .create(&entity, &specs)
        .await
        .map_err(|e| e.to_string())?;
    if connections.len() < specs.len() {
        eprintln!(
            "Skipped {} connection(s) to unknown entities",
            specs.len() - connections.len()
        );
    }

    print_json(&serde_json::json!({
        "entity": entity,
        "connections": connections,
    }));
    Ok(entity)
}

pub async fn remove(state: &AppState, id: &str) -> Result<(), String> {
    let deleted = state
        .entity_store
        .delete(id)
        .await
        .map_err(|e| e.to_string())?;
    if !deleted {
        return Err(format!("Workflow entity {} not found", id));
    }
    println!("Deleted workflow entity {}", id);
    Ok(())
}
