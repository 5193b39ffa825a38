use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::error::LLMError;

use super::{Options, Provider, encode_json, error_envelope_message};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;
const NAME: &str = "anthropic_messages";

#[derive(Debug, Deserialize)]
struct MessageResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Anthropic Messages Provider（兼容 Claude 3.x Messages API）
pub struct AnthropicMessagesProvider {
    base_url: String,
    api_key: String,
    model: String,
    version: String,
}

impl AnthropicMessagesProvider {
    /// 使用默认 base_url 与 anthropic-version 创建 Provider
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            version: DEFAULT_VERSION.to_string(),
        }
    }

    /// 自定义 base_url，便于接入代理或兼容层
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// 自定义 Anthropic API 版本（anthropic-version）
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }
}

impl Provider for AnthropicMessagesProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/v1") {
            format!("{base}/messages")
        } else {
            format!("{base}/v1/messages")
        }
    }

    fn headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert("x-api-key".to_string(), self.api_key.clone());
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers.insert("anthropic-version".to_string(), self.version.clone());
        headers
    }

    /// `max_tokens` is mandatory for the Messages API and defaults to 1024 when unset.
    fn prepare_request(&self, prompt: &str, options: &Options) -> Result<Vec<u8>, LLMError> {
        let mut body = Map::new();
        body.insert("model".to_string(), Value::String(self.model.clone()));
        body.insert(
            "messages".to_string(),
            json!([{ "role": "user", "content": prompt }]),
        );
        body.insert("max_tokens".to_string(), Value::from(DEFAULT_MAX_TOKENS));
        for (key, value) in options {
            body.insert(key.clone(), value.clone());
        }
        encode_json(NAME, &Value::Object(body))
    }

    fn parse_response(&self, body: &[u8]) -> Result<String, LLMError> {
        let parsed: MessageResponse =
            serde_json::from_slice(body).map_err(|err| LLMError::Decoding {
                provider: NAME,
                message: format!("failed to parse Anthropic response: {err}"),
            })?;

        let text: String = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect();
        if text.is_empty() {
            return Err(LLMError::Decoding {
                provider: NAME,
                message: "response contains no text".to_string(),
            });
        }
        Ok(text)
    }

    fn error_message(&self, body: &[u8]) -> Option<String> {
        error_envelope_message(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> AnthropicMessagesProvider {
        AnthropicMessagesProvider::new("sk-ant", "claude-3-5-sonnet")
    }

    #[test]
    fn headers_carry_key_and_version() {
        let headers = provider().with_version("2024-01-01").headers();
        assert_eq!(headers["x-api-key"], "sk-ant");
        assert_eq!(headers["anthropic-version"], "2024-01-01");
        assert_eq!(provider().endpoint(), "https://api.anthropic.com/v1/messages");
    }

    #[test]
    fn prepare_request_defaults_max_tokens_and_lets_options_override() {
        let body: Value =
            serde_json::from_slice(&provider().prepare_request("Hi", &Options::new()).unwrap())
                .unwrap();
        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["messages"][0]["content"], "Hi");

        let mut options = Options::new();
        options.insert("max_tokens".to_string(), json!(64));
        options.insert("temperature".to_string(), json!(0.3));
        let body: Value =
            serde_json::from_slice(&provider().prepare_request("Hi", &options).unwrap()).unwrap();
        assert_eq!(body["max_tokens"], 64);
        assert_eq!(body["temperature"].as_f64(), Some(0.3));
    }

    #[test]
    fn parse_response_concatenates_text_blocks() {
        let body = br#"{"id":"msg_1","type":"message","role":"assistant","content":[{"type":"thinking","thinking":"..."},{"type":"text","text":"Hello"},{"type":"text","text":" world"}],"stop_reason":"end_turn"}"#;
        assert_eq!(provider().parse_response(body).unwrap(), "Hello world");
    }

    #[test]
    fn parse_response_requires_text() {
        let err = provider()
            .parse_response(br#"{"content":[{"type":"tool_use","id":"t","name":"x","input":{}}]}"#)
            .unwrap_err();
        assert!(matches!(err, LLMError::Decoding { provider: "anthropic_messages", .. }));
    }

    #[test]
    fn parse_response_rejects_empty_text_block() {
        let err = provider()
            .parse_response(br#"{"content":[{"type":"text","text":""}],"stop_reason":"end_turn"}"#)
            .unwrap_err();
        assert!(matches!(err, LLMError::Decoding { provider: "anthropic_messages", .. }));
    }

    #[test]
    fn error_message_reads_anthropic_envelope() {
        let body = br#"{"type":"error","error":{"type":"authentication_error","message":"invalid x-api-key"}}"#;
        assert_eq!(provider().error_message(body).as_deref(), Some("invalid x-api-key"));
    }
}
