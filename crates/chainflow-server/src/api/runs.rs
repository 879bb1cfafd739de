use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use chainflow_core::chain::{ChainFailure, InstructionOverrides};
use chainflow_core::models::Run;
use chainflow_core::{AppState, ServerError};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/workflow/{workflow_id}", post(trigger_workflow).get(list_workflow_runs))
        .route("/{run_id}", get(get_run_status))
        .route("/{run_id}/entity/{entity_id}", get(get_entity_run_status))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TriggerRequest {
    input_text: String,
    #[serde(default)]
    agent_prompts: Option<InstructionOverrides>,
}

/// Run the workflow to completion before answering. A failed execution
/// still reports its `runId`.
async fn trigger_workflow(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
    Json(body): Json<TriggerRequest>,
) -> Result<Json<serde_json::Value>, ChainFailure> {
    let outcome = state
        .orchestrator
        .start(&workflow_id, &body.input_text, body.agent_prompts.as_ref())
        .await
        .map_err(|e| {
            tracing::error!("Error executing workflow {}: {}", workflow_id, e);
            e
        })?;

    Ok(Json(serde_json::json!({
        "runId": outcome.run_id,
        "workflowId": outcome.workflow_id,
        "message": "Workflow execution completed successfully",
        "output": outcome.output,
    })))
}

async fn list_workflow_runs(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    state
        .workflow_store
        .get(&workflow_id)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("Workflow {} not found", workflow_id)))?;

    let runs = state.ledger.list_for_workflow(&workflow_id).await?;
    Ok(Json(serde_json::json!({ "runs": runs })))
}

async fn get_run_status(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let runs = state.ledger.status(&run_id).await?;
    Ok(Json(serde_json::json!({ "runs": runs })))
}

async fn get_entity_run_status(
    State(state): State<AppState>,
    Path((run_id, entity_id)): Path<(String, String)>,
) -> Result<Json<Run>, ServerError> {
    state.ledger.entity_status(&run_id, &entity_id).await.map(Json)
}
