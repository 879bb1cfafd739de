use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use chainflow_core::models::{ConnectionSpec, Workflow, WorkflowEntity, DEFAULT_PROJECT_ID};
use chainflow_core::{AppState, ServerError};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_workflows).post(create_workflow))
        .route("/project/{project_id}", get(list_project_workflows))
        .route(
            "/{id}",
            get(get_workflow).patch(update_workflow).delete(delete_workflow),
        )
        .route("/{id}/entities", get(list_entities).post(create_entity))
        .route("/{id}/connections", get(list_connections))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    project_id: Option<String>,
    #[serde(default)]
    skip: usize,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    100
}

async fn list_workflows(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let workflows = state
        .workflow_store
        .list(query.project_id.as_deref(), query.skip, query.limit)
        .await?;
    Ok(Json(serde_json::json!({ "workflows": workflows })))
}

async fn list_project_workflows(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let workflows = state
        .workflow_store
        .list(Some(&project_id), query.skip, query.limit)
        .await?;
    Ok(Json(serde_json::json!({ "workflows": workflows })))
}

async fn load_workflow(state: &AppState, id: &str) -> Result<Workflow, ServerError> {
    state
        .workflow_store
        .get(id)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("Workflow {} not found", id)))
}

async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let workflow = load_workflow(&state, &id).await?;
    let entities = state.entity_store.list_by_workflow(&id).await?;
    Ok(Json(serde_json::json!({
        "workflow": workflow,
        "entities": entities,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateWorkflowRequest {
    name: String,
    #[serde(rename = "type")]
    workflow_type: String,
    description: Option<String>,
    project_id: Option<String>,
}

async fn create_workflow(
    State(state): State<AppState>,
    Json(body): Json<CreateWorkflowRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ServerError> {
    if body.name.trim().is_empty() {
        return Err(ServerError::BadRequest("Workflow name is required".into()));
    }

    let project_id = body
        .project_id
        .unwrap_or_else(|| DEFAULT_PROJECT_ID.to_string());
    state
        .project_store
        .get(&project_id)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("Project {} not found", project_id)))?;

    let workflow = Workflow::new(
        uuid::Uuid::new_v4().to_string(),
        body.name,
        body.workflow_type,
        body.description,
        project_id,
    );
    state.workflow_store.save(&workflow).await?;
    tracing::info!("Created workflow '{}' ({})", workflow.name, workflow.id);

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "workflow": workflow })),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateWorkflowRequest {
    name: Option<String>,
    description: Option<String>,
}

async fn update_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateWorkflowRequest>,
) -> Result<Json<serde_json::Value>, ServerError> {
    load_workflow(&state, &id).await?;

    state
        .workflow_store
        .update(&id, body.name.as_deref(), body.description.as_deref())
        .await?;

    let workflow = load_workflow(&state, &id).await?;
    Ok(Json(serde_json::json!({ "workflow": workflow })))
}

async fn delete_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ServerError> {
    if !state.workflow_store.delete(&id).await? {
        return Err(ServerError::NotFound(format!("Workflow {} not found", id)));
    }
    tracing::info!("Deleted workflow {}", id);
    Ok(StatusCode::NO_CONTENT)
}

async fn list_entities(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    load_workflow(&state, &id).await?;
    let entities = state.entity_store.list_by_workflow(&id).await?;
    Ok(Json(serde_json::json!({ "entities": entities })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateEntityRequest {
    external_id: String,
    #[serde(rename = "type")]
    entity_type: String,
    label: Option<String>,
    prompt: Option<String>,
    data: Option<serde_json::Value>,
    order: Option<f64>,
    #[serde(default)]
    connections: Vec<ConnectionSpec>,
}

async fn create_entity(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<CreateEntityRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ServerError> {
    load_workflow(&state, &id).await?;

    let mut entity = WorkflowEntity::new(
        uuid::Uuid::new_v4().to_string(),
        id,
        body.external_id,
        body.entity_type,
        body.order.unwrap_or(0.0),
    );
    entity.label = body.label;
    entity.prompt = body.prompt;
    entity.data = body.data;

    let connections = state.entity_store.create(&entity, &body.connections).await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "entity": entity,
            "connections": connections,
        })),
    ))
}

async fn list_connections(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    load_workflow(&state, &id).await?;
    let connections = state.entity_store.list_connections(&id).await?;
    Ok(Json(serde_json::json!({ "connections": connections })))
}
