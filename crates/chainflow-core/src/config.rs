//! Runtime configuration read from the environment.
//!
//! | Variable                         | Default                                   |
//! |----------------------------------|-------------------------------------------|
//! | `CHAINFLOW_ADAPTER`              | `openai` (`openai` or `anthropic`)        |
//! | `CHAINFLOW_BASE_URL`             | `https://api.groq.com/openai/v1`          |
//! | `CHAINFLOW_API_KEY`              | `GROQ_API_KEY`, then `OPENAI_API_KEY`     |
//! | `CHAINFLOW_MODEL`                | `qwen-2.5-32b`                            |
//! | `CHAINFLOW_TEMPERATURE`          | unset                                     |
//! | `CHAINFLOW_REQUEST_TIMEOUT_SECS` | `300`                                     |
//! | `CHAINFLOW_STEP_TIMEOUT_SECS`    | unset (no per-step limit)                 |
//! | `CHAINFLOW_KEEP_ALIVE_SECS`      | `1`                                       |
//! | `CHAINFLOW_BACKGROUND_TICK_SECS` | unset (no background ticks)               |
//!
//! Duration variables take whole seconds and must be at least 1.

use std::time::Duration;

use crate::error::ServerError;

/// Wire protocol spoken by the generation backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adapter {
    /// `POST {base_url}/chat/completions` (OpenAI, Groq, NVIDIA NIM, ...)
    OpenAi,
    /// `POST {base_url}/v1/messages`
    Anthropic,
}

impl Adapter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ServerError> {
        match s.to_lowercase().as_str() {
            "openai" | "groq" | "openai-compatible" => Ok(Self::OpenAi),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            other => Err(ServerError::BadRequest(format!(
                "Unknown adapter type: '{}'",
                other
            ))),
        }
    }
}

/// Connection settings for the HTTP generation backend.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub adapter: Adapter,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: Option<f64>,
    pub max_tokens: u32,
    pub request_timeout: Duration,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            adapter: Adapter::OpenAi,
            base_url: "https://api.groq.com/openai/v1".to_string(),
            api_key: String::new(),
            model: "qwen-2.5-32b".to_string(),
            temperature: None,
            max_tokens: 4096,
            request_timeout: Duration::from_secs(300),
        }
    }
}

impl GeneratorConfig {
    pub fn from_env() -> Result<Self, ServerError> {
        let defaults = Self::default();

        let adapter = match env("CHAINFLOW_ADAPTER") {
            Some(raw) => Adapter::parse(&raw)?,
            None => defaults.adapter,
        };

        let api_key = env("CHAINFLOW_API_KEY")
            .or_else(|| env("GROQ_API_KEY"))
            .or_else(|| env("OPENAI_API_KEY"))
            .or_else(|| env("ANTHROPIC_API_KEY"))
            .unwrap_or_default();

        let temperature = env("CHAINFLOW_TEMPERATURE")
            .map(|raw| {
                raw.parse::<f64>().map_err(|e| {
                    ServerError::BadRequest(format!("Invalid CHAINFLOW_TEMPERATURE '{}': {}", raw, e))
                })
            })
            .transpose()?;

        Ok(Self {
            adapter,
            base_url: env("CHAINFLOW_BASE_URL").unwrap_or(defaults.base_url),
            api_key,
            model: env("CHAINFLOW_MODEL").unwrap_or(defaults.model),
            temperature,
            max_tokens: defaults.max_tokens,
            request_timeout: secs("CHAINFLOW_REQUEST_TIMEOUT_SECS")?
                .unwrap_or(defaults.request_timeout),
        })
    }
}

/// Knobs for the chain engine and event bus.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on a single generation call. `None` waits indefinitely.
    pub step_timeout: Option<Duration>,
    /// Idle window after which subscribers receive a keep-alive.
    pub keep_alive: Duration,
    /// Period of the `background-update` broadcast, if enabled.
    pub background_tick: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            step_timeout: None,
            keep_alive: Duration::from_secs(1),
            background_tick: None,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ServerError> {
        let defaults = Self::default();
        Ok(Self {
            step_timeout: secs("CHAINFLOW_STEP_TIMEOUT_SECS")?,
            keep_alive: secs("CHAINFLOW_KEEP_ALIVE_SECS")?.unwrap_or(defaults.keep_alive),
            background_tick: secs("CHAINFLOW_BACKGROUND_TICK_SECS")?,
        })
    }
}

fn env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// A positive number of seconds. Unset means `None`; zero is rejected.
fn secs(key: &str) -> Result<Option<Duration>, ServerError> {
    env(key)
        .map(|raw| match raw.trim().parse::<u64>() {
            Ok(0) => Err(ServerError::BadRequest(format!(
                "Invalid {} '{}': must be at least 1",
                key, raw
            ))),
            Ok(n) => Ok(Duration::from_secs(n)),
            Err(e) => Err(ServerError::BadRequest(format!("Invalid {} '{}': {}", key, raw, e))),
        })
        .transpose()
}

/// Load `KEY=VALUE` pairs from `.env.local` then `.env` into the process
/// environment. Variables that are already set win.
pub fn load_dotenv() {
    for filename in &[".env.local", ".env"] {
        let path = std::path::Path::new(filename);
        let Ok(content) = std::fs::read_to_string(path) else {
            continue;
        };
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let mut value = value.trim().to_string();
                if value.len() >= 2
                    && ((value.starts_with('"') && value.ends_with('"'))
                        || (value.starts_with('\'') && value.ends_with('\'')))
                {
                    value = value[1..value.len() - 1].to_string();
                }
                if std::env::var(key).is_err() {
                    std::env::set_var(key, &value);
                }
            }
        }
        tracing::info!("[Config] Loaded environment from '{}'", filename);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_aliases() {
        assert_eq!(Adapter::parse("Groq").unwrap(), Adapter::OpenAi);
        assert_eq!(Adapter::parse("claude").unwrap(), Adapter::Anthropic);
        assert!(matches!(
            Adapter::parse("carrier-pigeon"),
            Err(ServerError::BadRequest(_))
        ));
    }

    #[test]
    fn test_engine_config_reads_step_timeout() {
        std::env::set_var("CHAINFLOW_STEP_TIMEOUT_SECS", "45");
        let config = EngineConfig::from_env().unwrap();
        assert_eq!(config.step_timeout, Some(Duration::from_secs(45)));

        std::env::set_var("CHAINFLOW_STEP_TIMEOUT_SECS", "soon");
        assert!(EngineConfig::from_env().is_err());

        std::env::set_var("CHAINFLOW_STEP_TIMEOUT_SECS", "0");
        assert!(matches!(EngineConfig::from_env(), Err(ServerError::BadRequest(_))));
        std::env::remove_var("CHAINFLOW_STEP_TIMEOUT_SECS");
    }

    #[test]
    fn test_zero_durations_rejected() {
        let key = "CHAINFLOW_TEST_ZERO_SECS";
        std::env::set_var(key, "0");
        let err = secs(key).unwrap_err();
        assert!(err.to_string().contains("must be at least 1"));

        std::env::set_var(key, " 2 ");
        assert_eq!(secs(key).unwrap(), Some(Duration::from_secs(2)));

        std::env::remove_var(key);
        assert_eq!(secs(key).unwrap(), None);
    }
}
