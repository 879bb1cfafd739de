//! `chainflow run` — Inspect recorded runs.

use chainflow_core::state::AppState;

use super::print_json;

/// Print every entity run of `run_id`, or a single one with `entity_id`.
pub async fn status(state: &AppState, run_id: &str, entity_id: Option<&str>) -> Result<(), String> {
    let value = match entity_id {
        Some(entity_id) => {
            let run = state
                .ledger
                .entity_status(run_id, entity_id)
                .await
                .map_err(|e| e.to_string())?;
            serde_json::json!({ "run": run })
        }
        None => {
            let runs = state.ledger.status(run_id).await.map_err(|e| e.to_string())?;
            serde_json::json!({ "runs": runs })
        }
    };
    print_json(&value);
    Ok(())
}

pub async fn list(state: &AppState, workflow_id: &str) -> Result<(), String> {
    state
        .workflow_store
        .get(workflow_id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("Workflow {} not found", workflow_id))?;

    let runs = state
        .ledger
        .list_for_workflow(workflow_id)
        .await
        .map_err(|e| e.to_string())?;
    print_json(&serde_json::json!({ "runs": runs }));
    Ok(())
}
