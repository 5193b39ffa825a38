//! Local Ollama server (`/api/generate`).
//!
//! Ollama answers with newline-delimited JSON objects, each carrying a text fragment and a
//! `done` flag. The provider reassembles them into one completion.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::context::CallContext;
use crate::engine::{Attempt, Generation, LLM, run_attempt};
use crate::error::LLMError;
use crate::http::DynHttpTransport;
use crate::logging::{DynLogger, LogLevel, Logger, NoopLogger};
use crate::prompt::Prompt;

use super::{Options, Provider, encode_json, error_envelope_message};

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const GENERATE_PATH: &str = "/api/generate";
const NAME: &str = "ollama";

/// One line of the `/api/generate` response stream.
#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    /// Set by the server instead of a fragment when generation fails mid-stream.
    #[serde(default)]
    error: Option<String>,
}

/// Ollama Provider 同时也是一个完整的 LLM
///
/// Used through [`LLM`] it performs exactly one attempt per call, without the retry loop of
/// [`crate::engine::RetryingLLM`].
pub struct OllamaProvider {
    transport: DynHttpTransport,
    model: String,
    base_url: String,
    options: Options,
    logger: Option<DynLogger>,
    timeout: Option<Duration>,
}

impl OllamaProvider {
    /// 使用默认本地地址创建 Provider
    pub fn new(transport: DynHttpTransport, model: impl Into<String>) -> Self {
        Self {
            transport,
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            options: Map::new(),
            logger: None,
            timeout: None,
        }
    }

    /// 自定义 base_url
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Attaches a logger; without one, logging and `set_debug_level` are no-ops.
    pub fn with_logger(mut self, logger: DynLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn options(&self) -> &Options {
        &self.options
    }
}

impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn endpoint(&self) -> String {
        format!("{}{GENERATE_PATH}", self.base_url.trim_end_matches('/'))
    }

    fn headers(&self) -> HashMap<String, String> {
        HashMap::from([("Content-Type".to_string(), "application/json".to_string())])
    }

    fn prepare_request(&self, prompt: &str, options: &Options) -> Result<Vec<u8>, LLMError> {
        let mut body = Map::new();
        body.insert("model".to_string(), Value::String(self.model.clone()));
        body.insert("prompt".to_string(), Value::String(prompt.to_string()));
        for (key, value) in options {
            body.insert(key.clone(), value.clone());
        }
        encode_json(NAME, &Value::Object(body))
    }

    fn parse_response(&self, body: &[u8]) -> Result<String, LLMError> {
        let mut text = String::new();
        let mut seen = 0usize;

        for chunk in serde_json::Deserializer::from_slice(body).into_iter::<GenerateChunk>() {
            let chunk = chunk.map_err(|err| LLMError::Decoding {
                provider: NAME,
                message: format!("error parsing Ollama response: {err}"),
            })?;
            seen += 1;
            if let Some(message) = chunk.error {
                return Err(LLMError::Decoding {
                    provider: NAME,
                    message: format!("Ollama reported an error: {message}"),
                });
            }
            text.push_str(&chunk.response);
            if chunk.done {
                break;
            }
        }

        if seen == 0 || text.is_empty() {
            return Err(LLMError::Decoding {
                provider: NAME,
                message: "empty Ollama response".to_string(),
            });
        }
        Ok(text)
    }

    fn error_message(&self, body: &[u8]) -> Option<String> {
        error_envelope_message(body)
    }
}

#[async_trait]
impl LLM for OllamaProvider {
    async fn generate(&self, ctx: &CallContext, prompt: &Prompt) -> Result<Generation, LLMError> {
        let rendered = prompt.render();
        let logger: &dyn Logger = match self.logger.as_deref() {
            Some(logger) => logger,
            None => &NoopLogger,
        };

        let text = run_attempt(Attempt {
            ctx,
            provider: self,
            transport: self.transport.as_ref(),
            logger,
            prompt: &rendered,
            options: &self.options,
            timeout: self.timeout,
        })
        .await?;

        Ok(Generation {
            text,
            rendered_prompt: rendered,
        })
    }

    fn set_option(&mut self, key: &str, value: Value) {
        if let Some(logger) = &self.logger {
            logger.debug(
                "Setting option for Ollama",
                &[("key", &key), ("value", &value)],
            );
        }
        self.options.insert(key.to_string(), value);
    }

    fn set_debug_level(&mut self, level: LogLevel) {
        if let Some(logger) = &self.logger {
            logger.set_level(level);
        }
    }

    fn set_endpoint(&mut self, endpoint: &str) {
        self.base_url = endpoint.to_string();
    }
}
