use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether the run has reached a final state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution record of one entity within one execution instance.
///
/// Identity is `(id, entity_id)`: `id` is the run id shared by every entity
/// processed in the same chain execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub id: String,
    pub workflow_id: String,
    pub entity_id: String,
    pub input_text: String,
    pub output_text: String,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
}

impl Run {
    pub fn processing(
        id: String,
        workflow_id: String,
        entity_id: String,
        input_text: String,
    ) -> Self {
        Self {
            id,
            workflow_id,
            entity_id,
            input_text,
            output_text: String::new(),
            status: RunStatus::Processing,
            created_at: Utc::now(),
        }
    }
}
