use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};

use chainflow_core::models::WorkflowEntity;
use chainflow_core::{AppState, ServerError};

pub fn router() -> Router<AppState> {
    Router::new().route("/{id}", get(get_entity).delete(delete_entity))
}

async fn get_entity(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<WorkflowEntity>, ServerError> {
    state
        .entity_store
        .get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ServerError::NotFound(format!("Workflow entity {} not found", id)))
}

async fn delete_entity(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ServerError> {
    if !state.entity_store.delete(&id).await? {
        return Err(ServerError::NotFound(format!("Workflow entity {} not found", id)));
    }
    tracing::info!("Deleted workflow entity {}", id);
    Ok(StatusCode::NO_CONTENT)
}
