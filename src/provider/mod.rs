use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::LLMError;

pub mod anthropic_messages;
pub mod google_gemini;
pub mod ollama;
pub mod openai_chat;
pub mod registry;

pub use ollama::OllamaProvider;
pub use registry::{ProviderFactory, ProviderRegistry};

/// 生成参数 例如 temperature 与 max_tokens
pub type Options = Map<String, Value>;

/// 统一的 Provider Trait 负责请求编码与响应解码
///
/// Implementations are pure codecs: the HTTP exchange, retries and logging live in
/// [`crate::engine::RetryingLLM`].
pub trait Provider: Send + Sync {
    /// 供应商名称 用于日志与结果归属
    fn name(&self) -> &str;

    /// 完整的请求 URL
    fn endpoint(&self) -> String;

    /// 请求头 至少包含 Content-Type
    fn headers(&self) -> HashMap<String, String>;

    /// Encodes the rendered prompt and generation options into a request body.
    ///
    /// # Errors
    ///
    /// Returns [`LLMError::Encoding`] when the payload cannot be serialized.
    fn prepare_request(&self, prompt: &str, options: &Options) -> Result<Vec<u8>, LLMError>;

    /// Decodes a successful response body into generated text.
    ///
    /// # Errors
    ///
    /// Returns [`LLMError::Decoding`] on malformed payloads.
    fn parse_response(&self, body: &[u8]) -> Result<String, LLMError>;

    /// Human-readable message extracted from an error response body, if recognizable.
    fn error_message(&self, _body: &[u8]) -> Option<String> {
        None
    }
}

/// Provider handed out by the registry.
///
/// The local Ollama variant is kept concrete because it is also a complete [`crate::LLM`]
/// with a mutable endpoint; every other backend is used opaquely.
pub enum ResolvedProvider {
    Local(OllamaProvider),
    Remote(Box<dyn Provider>),
}

impl ResolvedProvider {
    pub fn name(&self) -> &str {
        match self {
            ResolvedProvider::Local(provider) => provider.name(),
            ResolvedProvider::Remote(provider) => provider.name(),
        }
    }
}

/// Serializes a JSON body, mapping failures to [`LLMError::Encoding`].
pub(crate) fn encode_json(provider: &'static str, body: &Value) -> Result<Vec<u8>, LLMError> {
    serde_json::to_vec(body).map_err(|err| LLMError::Encoding {
        provider,
        message: err.to_string(),
    })
}

/// Extracts `error.message` from the common `{"error": {"message": ...}}` envelope.
pub(crate) fn error_envelope_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    let error = value.get("error")?;
    match error {
        Value::String(message) => Some(message.clone()),
        Value::Object(_) => error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

/// Non-empty API key or a resolution error naming the provider.
pub(crate) fn require_api_key(provider: &'static str, api_key: &str) -> Result<String, LLMError> {
    let key = api_key.trim();
    if key.is_empty() {
        return Err(LLMError::resolution(
            provider,
            format!("provider {provider} requires an API key"),
        ));
    }
    Ok(key.to_string())
}
