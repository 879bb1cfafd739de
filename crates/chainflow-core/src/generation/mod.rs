//! Generation backends: the black box that turns instructions plus input
//! text into output.
//!
//! The chain engine only sees the [`Generator`] trait. [`HttpGenerator`]
//! talks to OpenAI-compatible and Anthropic-compatible HTTP APIs; tests plug
//! in scripted fakes.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ServerError;

pub use http::HttpGenerator;

/// One processing call: a named, role-tagged agent configured with
/// `instructions`, fed `input_text`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub name: String,
    pub role: String,
    pub instructions: String,
    pub input_text: String,
}

impl GenerationRequest {
    /// System prompt sent to chat-style backends.
    pub fn system_prompt(&self) -> String {
        format!(
            "You are {}.\nRole: {}\n\n{}",
            self.name, self.role, self.instructions
        )
    }
}

#[async_trait]
pub trait Generator: Send + Sync {
    /// Run one generation. Any upstream failure (transport, quota, malformed
    /// response) is reported as [`ServerError::Generation`].
    async fn generate(&self, request: &GenerationRequest) -> Result<serde_json::Value, ServerError>;
}
