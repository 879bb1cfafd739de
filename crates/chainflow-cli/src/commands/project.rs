//! `chainflow project` — Project management commands.

use chainflow_core::models::Project;
use chainflow_core::state::AppState;

use super::print_json;

pub async fn list(state: &AppState) -> Result<(), String> {
    let projects = state.project_store.list().await.map_err(|e| e.to_string())?;
    print_json(&serde_json::json!({ "projects": projects }));
    Ok(())
}

pub async fn create(state: &AppState, name: &str, description: Option<&str>) -> Result<Project, String> {
    if name.trim().is_empty() {
        return Err("Project name is required".to_string());
    }
    let project = Project::new(
        uuid::Uuid::new_v4().to_string(),
        name.to_string(),
        description.map(|s| s.to_string()),
    );
    state.project_store.save(&project).await.map_err(|e| e.to_string())?;
    print_json(&serde_json::json!({ "project": project }));
    Ok(project)
}
