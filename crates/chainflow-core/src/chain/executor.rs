//! Step execution: runs one entity through the generation backend.

use std::sync::Arc;

use crate::chain::roles::resolve_agent;
use crate::error::ServerError;
use crate::events::{EventBus, AGENT_RESPONSE};
use crate::generation::{GenerationRequest, Generator};
use crate::models::entity::WorkflowEntity;

#[derive(Clone)]
pub struct StepExecutor {
    generator: Arc<dyn Generator>,
    event_bus: EventBus,
}

impl StepExecutor {
    pub fn new(generator: Arc<dyn Generator>, event_bus: EventBus) -> Self {
        Self {
            generator,
            event_bus,
        }
    }

    /// Process `input_text` as `entity` and return the output text.
    ///
    /// Publishes `agent-response` on success. Generation errors are returned
    /// as they are; nothing is retried here.
    pub async fn run(
        &self,
        entity: &WorkflowEntity,
        input_text: &str,
        instructions_override: Option<&str>,
    ) -> Result<String, ServerError> {
        let agent = resolve_agent(entity, instructions_override);
        tracing::info!(
            "[StepExecutor] Running entity {} ({}) as '{}'",
            entity.id,
            entity.entity_type,
            agent.name
        );

        let request = GenerationRequest {
            name: agent.name,
            role: agent.role,
            instructions: agent.instructions,
            input_text: input_text.to_string(),
        };

        let raw = self.generator.generate(&request).await?;
        let output = normalize_output(raw);

        self.event_bus.publish(
            AGENT_RESPONSE,
            serde_json::json!({
                "name": request.name,
                "role": request.role,
                "agent_response": output,
            }),
        );

        Ok(output)
    }
}

/// Flatten a generation result to text: strings pass through, everything
/// else is serialized as JSON.
pub fn normalize_output(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}
