use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use chainflow_core::models::Project;
use chainflow_core::{AppState, ServerError};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_projects).post(create_project))
        .route("/{id}", get(get_project))
}

async fn list_projects(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let projects = state.project_store.list().await?;
    Ok(Json(serde_json::json!({ "projects": projects })))
}

async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Project>, ServerError> {
    state
        .project_store
        .get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ServerError::NotFound(format!("Project {} not found", id)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateProjectRequest {
    name: String,
    description: Option<String>,
}

async fn create_project(
    State(state): State<AppState>,
    Json(body): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ServerError> {
    if body.name.trim().is_empty() {
        return Err(ServerError::BadRequest("Project name is required".into()));
    }
    let project = Project::new(uuid::Uuid::new_v4().to_string(), body.name, body.description);
    state.project_store.save(&project).await?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "project": project }))))
}
