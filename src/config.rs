use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::LLMError;
use crate::logging::LogLevel;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_TEMPERATURE: f64 = 0.7;
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Per-call generation settings for one provider/model pair.
///
/// Durations are (de)serialized as milliseconds under `timeout_ms` and `retry_delay_ms`.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use hikaku_llm::config::Config;
///
/// let config = Config::new("openai_chat", "gpt-4.1-mini")
///     .with_api_key("openai_chat", "sk-test")
///     .with_max_retries(2)
///     .with_retry_delay(Duration::from_millis(250));
/// assert_eq!(config.api_key(), "sk-test");
/// assert_eq!(config.max_retries, 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Registry name of the backend, e.g. `ollama` or `anthropic_messages`.
    pub provider: String,
    pub model: String,
    /// API keys keyed by provider name.
    pub api_keys: HashMap<String, String>,
    #[serde(rename = "timeout_ms", with = "duration_millis")]
    pub timeout: Duration,
    pub max_retries: u32,
    #[serde(rename = "retry_delay_ms", with = "duration_millis")]
    pub retry_delay: Duration,
    pub log_level: LogLevel,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Base URL override for the local Ollama server.
    pub ollama_endpoint: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: String::new(),
            model: String::new(),
            api_keys: HashMap::new(),
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            log_level: LogLevel::default(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            ollama_endpoint: None,
        }
    }
}

impl Config {
    /// Creates a config with default retry, timeout and sampling settings.
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            ..Self::default()
        }
    }

    /// Parses a JSON document, filling missing fields with defaults.
    pub fn from_json_str(json: &str) -> Result<Self, LLMError> {
        let config: Config = serde_json::from_str(json).map_err(|err| LLMError::InvalidConfig {
            field: "config".to_string(),
            reason: err.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_api_key(mut self, provider: impl Into<String>, key: impl Into<String>) -> Self {
        self.api_keys.insert(provider.into(), key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_ollama_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.ollama_endpoint = Some(endpoint.into());
        self
    }

    /// API key registered for [`Config::provider`], empty when none is set.
    pub fn api_key(&self) -> &str {
        self.api_keys
            .get(&self.provider)
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Checks the fields every provider needs.
    pub fn validate(&self) -> Result<(), LLMError> {
        if self.provider.trim().is_empty() {
            return Err(LLMError::InvalidConfig {
                field: "provider".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.model.trim().is_empty() {
            return Err(LLMError::InvalidConfig {
                field: "model".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
