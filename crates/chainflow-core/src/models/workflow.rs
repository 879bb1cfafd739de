use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named, ordered collection of entities belonging to a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub workflow_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub project_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    pub fn new(
        id: String,
        name: String,
        workflow_type: String,
        description: Option<String>,
        project_id: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            workflow_type,
            description,
            project_id,
            created_at: now,
            updated_at: now,
        }
    }
}
