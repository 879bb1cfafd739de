use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One step of a workflow chain.
///
/// `order` is only a sort key: several entities may share a value, in which
/// case insertion order decides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowEntity {
    pub id: String,
    pub external_id: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    pub order: f64,
    pub workflow_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowEntity {
    pub fn new(
        id: String,
        workflow_id: String,
        external_id: String,
        entity_type: String,
        order: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            external_id,
            entity_type,
            label: None,
            prompt: None,
            data: None,
            order,
            workflow_id,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// A directed edge between two entities of the same workflow.
///
/// Connections are display metadata for graph editors; the chain engine
/// ignores them and runs entities by `order`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityConnection {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub workflow_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<serde_json::Value>,
    pub animated: bool,
}

/// Connection declared at entity creation time, addressed by the target's
/// `external_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSpec {
    pub target_id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub style: Option<serde_json::Value>,
    #[serde(default = "default_animated")]
    pub animated: bool,
}

fn default_animated() -> bool {
    true
}
