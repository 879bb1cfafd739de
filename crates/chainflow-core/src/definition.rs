//! Declarative workflow definitions (YAML or JSON) and their installation
//! into the store.
//!
//! ```yaml
//! name: "Story"
//! type: "narrative"
//! description: "Lead writes, dialogue follows"
//!
//! entities:
//!   - id: "lead-1"
//!     type: "lead"
//!     order: 1
//!     connections:
//!       - targetId: "dialogue-1"
//!   - id: "dialogue-1"
//!     type: "dialogue"
//!     label: "Banter Writer"
//!     prompt: "Keep it short."
//!     order: 2
//! ```
//!
//! Entities are inserted in declaration order; connections are added once
//! every entity exists, so forward references resolve.

use serde::{Deserialize, Serialize};

use crate::error::ServerError;
use crate::models::entity::{ConnectionSpec, WorkflowEntity};
use crate::models::workflow::Workflow;
use crate::store::{EntityStore, ProjectStore, WorkflowStore};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,

    #[serde(rename = "type", default = "default_workflow_type")]
    pub workflow_type: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Target project; the default project when absent.
    #[serde(default, rename = "projectId", alias = "project_id")]
    pub project_id: Option<String>,

    #[serde(default)]
    pub entities: Vec<EntityDefinition>,
}

fn default_workflow_type() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDefinition {
    /// Caller-chosen id, unique within the workflow.
    pub id: String,

    #[serde(rename = "type")]
    pub entity_type: String,

    #[serde(default)]
    pub label: Option<String>,

    #[serde(default)]
    pub prompt: Option<String>,

    #[serde(default)]
    pub data: Option<serde_json::Value>,

    #[serde(default)]
    pub order: f64,

    #[serde(default)]
    pub connections: Vec<ConnectionSpec>,
}

impl WorkflowDefinition {
    pub fn from_yaml(content: &str) -> Result<Self, ServerError> {
        let def: Self = serde_yaml::from_str(content)
            .map_err(|e| ServerError::BadRequest(format!("Invalid workflow YAML: {}", e)))?;
        def.validate()?;
        Ok(def)
    }

    pub fn from_json(content: &str) -> Result<Self, ServerError> {
        let def: Self = serde_json::from_str(content)
            .map_err(|e| ServerError::BadRequest(format!("Invalid workflow JSON: {}", e)))?;
        def.validate()?;
        Ok(def)
    }

    /// Load from a file, picking the format by extension (`.json`, else YAML).
    pub fn from_file(path: &std::path::Path) -> Result<Self, ServerError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ServerError::BadRequest(format!("Failed to read {}: {}", path.display(), e))
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&content),
            _ => Self::from_yaml(&content),
        }
    }

    fn validate(&self) -> Result<(), ServerError> {
        if self.name.trim().is_empty() {
            return Err(ServerError::BadRequest("Workflow name is required".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for entity in &self.entities {
            if !seen.insert(entity.id.as_str()) {
                return Err(ServerError::BadRequest(format!(
                    "Duplicate entity id '{}'",
                    entity.id
                )));
            }
        }
        Ok(())
    }

    /// Create the workflow with all its entities and connections.
    pub async fn install(
        &self,
        projects: &ProjectStore,
        workflows: &WorkflowStore,
        entities: &EntityStore,
    ) -> Result<Workflow, ServerError> {
        let project_id = match &self.project_id {
            Some(id) => {
                projects
                    .get(id)
                    .await?
                    .ok_or_else(|| ServerError::NotFound(format!("Project {} not found", id)))?
                    .id
            }
            None => projects.ensure_default().await?.id,
        };

        let workflow = Workflow::new(
            uuid::Uuid::new_v4().to_string(),
            self.name.clone(),
            self.workflow_type.clone(),
            self.description.clone(),
            project_id,
        );
        workflows.save(&workflow).await?;

        let mut created = Vec::with_capacity(self.entities.len());
        for def in &self.entities {
            let mut entity = WorkflowEntity::new(
                uuid::Uuid::new_v4().to_string(),
                workflow.id.clone(),
                def.id.clone(),
                def.entity_type.clone(),
                def.order,
            );
            entity.label = def.label.clone();
            entity.prompt = def.prompt.clone();
            entity.data = def.data.clone();
            entities.create(&entity, &[]).await?;
            created.push(entity);
        }

        for (entity, def) in created.iter().zip(&self.entities) {
            for spec in &def.connections {
                entities.connect(entity, spec).await?;
            }
        }

        tracing::info!(
            "Installed workflow '{}' ({}) with {} entities",
            workflow.name,
            workflow.id,
            created.len()
        );
        Ok(workflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::project::DEFAULT_PROJECT_ID;

    const STORY: &str = r#"
name: "Story"
type: "narrative"
entities:
  - id: "lead-1"
    type: "lead"
    order: 1
    connections:
      - targetId: "dialogue-1"
      - targetId: "missing"
  - id: "dialogue-1"
    type: "dialogue"
    label: "Banter Writer"
    order: 2
"#;

    #[test]
    fn test_parse_yaml_defaults() {
        let def = WorkflowDefinition::from_yaml(STORY).unwrap();
        assert_eq!(def.workflow_type, "narrative");
        assert_eq!(def.entities.len(), 2);
        assert!(def.entities[0].connections[0].animated);
        assert_eq!(def.entities[1].label.as_deref(), Some("Banter Writer"));
    }

    #[test]
    fn test_duplicate_entity_ids_rejected() {
        let json = r#"{"name":"x","entities":[{"id":"a","type":"lead"},{"id":"a","type":"critic"}]}"#;
        assert!(matches!(
            WorkflowDefinition::from_json(json),
            Err(ServerError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_install_resolves_forward_connections() {
        let db = Database::open_in_memory().unwrap();
        let projects = ProjectStore::new(db.clone());
        let workflows = WorkflowStore::new(db.clone());
        let entities = EntityStore::new(db.clone());

        let def = WorkflowDefinition::from_yaml(STORY).unwrap();
        let wf = def.install(&projects, &workflows, &entities).await.unwrap();

        assert_eq!(wf.project_id, DEFAULT_PROJECT_ID);
        let stored = entities.list_by_workflow(&wf.id).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].external_id, "lead-1");

        let connections = entities.list_connections(&wf.id).await.unwrap();
        assert_eq!(connections.len(), 1);
        assert_eq!(connections[0].source_id, stored[0].id);
        assert_eq!(connections[0].target_id, stored[1].id);
    }

    #[test]
    fn test_from_file_picks_format_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("story.json");
        std::fs::write(&path, r#"{"name":"Story","entities":[]}"#).unwrap();
        let def = WorkflowDefinition::from_file(&path).unwrap();
        assert_eq!(def.name, "Story");
        assert_eq!(def.workflow_type, "default");
    }
}
