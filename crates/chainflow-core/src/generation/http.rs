//! HTTP generation client.
//!
//! Calls the model API directly over HTTP. Two wire formats are supported:
//! OpenAI-style chat completions (also served by Groq and NVIDIA) and the
//! Anthropic messages API.

use async_trait::async_trait;

use crate::config::{Adapter, GeneratorConfig};
use crate::error::ServerError;
use crate::generation::{GenerationRequest, Generator};

pub struct HttpGenerator {
    client: reqwest::Client,
    config: GeneratorConfig,
}

impl HttpGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(config.request_timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            config,
        }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// POST {base_url}/chat/completions
    async fn call_openai_compatible(
        &self,
        request: &GenerationRequest,
    ) -> Result<serde_json::Value, ServerError> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        let mut body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "messages": [
                { "role": "system", "content": request.system_prompt() },
                { "role": "user", "content": request.input_text },
            ]
        });
        if let Some(temp) = self.config.temperature {
            body["temperature"] = temperature(temp);
        }

        tracing::info!(
            "[Generator] Calling chat completions: {} (model: {}, agent: {})",
            url,
            self.config.model,
            request.name
        );

        let json = self
            .send(
                self.client
                    .post(&url)
                    .header("Authorization", format!("Bearer {}", self.config.api_key)),
                &body,
            )
            .await?;

        json.get("choices")
            .and_then(|c| c.as_array())
            .and_then(|arr| arr.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|msg| msg.get("content"))
            .and_then(|c| c.as_str())
            .map(|s| serde_json::Value::String(s.to_string()))
            .ok_or_else(|| {
                ServerError::Generation("Response has no choices[0].message.content".to_string())
            })
    }

    /// POST {base_url}/v1/messages
    async fn call_anthropic_compatible(
        &self,
        request: &GenerationRequest,
    ) -> Result<serde_json::Value, ServerError> {
        let url = format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'));

        let mut body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "system": request.system_prompt(),
            "messages": [
                { "role": "user", "content": request.input_text }
            ]
        });
        if let Some(temp) = self.config.temperature {
            body["temperature"] = temperature(temp);
        }

        tracing::info!(
            "[Generator] Calling messages API: {} (model: {}, agent: {})",
            url,
            self.config.model,
            request.name
        );

        let json = self
            .send(
                self.client
                    .post(&url)
                    .header("x-api-key", &self.config.api_key)
                    .header("anthropic-version", "2023-06-01"),
                &body,
            )
            .await?;

        json.get("content")
            .and_then(|c| c.as_array())
            .and_then(|arr| {
                arr.iter()
                    .filter(|block| block.get("type").and_then(|t| t.as_str()) == Some("text"))
                    .filter_map(|block| block.get("text").and_then(|t| t.as_str()))
                    .map(|s| s.to_string())
                    .reduce(|a, b| format!("{}\n{}", a, b))
            })
            .map(serde_json::Value::String)
            .ok_or_else(|| ServerError::Generation("Response has no text content".to_string()))
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, ServerError> {
        let response = builder
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| ServerError::Generation(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| ServerError::Generation(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            return Err(ServerError::Generation(format!(
                "API returned {}: {}",
                status, response_text
            )));
        }

        serde_json::from_str(&response_text)
            .map_err(|e| ServerError::Generation(format!("Failed to parse response JSON: {}", e)))
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<serde_json::Value, ServerError> {
        if self.config.api_key.is_empty() {
            return Err(ServerError::Generation(
                "No API key found. Set CHAINFLOW_API_KEY (or GROQ_API_KEY / OPENAI_API_KEY)."
                    .to_string(),
            ));
        }
        match self.config.adapter {
            Adapter::OpenAi => self.call_openai_compatible(request).await,
            Adapter::Anthropic => self.call_anthropic_compatible(request).await,
        }
    }
}

fn temperature(temp: f64) -> serde_json::Value {
    serde_json::Value::Number(
        serde_json::Number::from_f64(temp).unwrap_or_else(|| serde_json::Number::from(0)),
    )
}
