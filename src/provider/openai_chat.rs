use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::error::LLMError;

use super::{Options, Provider, encode_json, error_envelope_message};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const NAME: &str = "openai_chat";

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<MessageContent>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    #[serde(default)]
    text: Option<String>,
}

/// OpenAI Chat Completions Provider
///
/// Also works with OpenAI-compatible servers through [`OpenAiChatProvider::with_base_url`].
pub struct OpenAiChatProvider {
    base_url: String,
    api_key: String,
    model: String,
    organization: Option<String>,
}

impl OpenAiChatProvider {
    /// 创建带默认 base_url 的 Provider
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            organization: None,
        }
    }

    /// 自定义 base_url
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// 配置组织 ID
    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }
}

impl Provider for OpenAiChatProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/v1") {
            format!("{base}/chat/completions")
        } else {
            format!("{base}/v1/chat/completions")
        }
    }

    fn headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert(
            "Authorization".to_string(),
            format!("Bearer {}", self.api_key),
        );
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers.insert("Accept".to_string(), "application/json".to_string());
        if let Some(org) = &self.organization {
            headers.insert("OpenAI-Organization".to_string(), org.clone());
        }
        headers
    }

    fn prepare_request(&self, prompt: &str, options: &Options) -> Result<Vec<u8>, LLMError> {
        let mut body = Map::new();
        body.insert("model".to_string(), Value::String(self.model.clone()));
        body.insert(
            "messages".to_string(),
            json!([{ "role": "user", "content": prompt }]),
        );
        for (key, value) in options {
            body.insert(key.clone(), value.clone());
        }
        encode_json(NAME, &Value::Object(body))
    }

    fn parse_response(&self, body: &[u8]) -> Result<String, LLMError> {
        let parsed: ChatCompletion =
            serde_json::from_slice(body).map_err(|err| LLMError::Decoding {
                provider: NAME,
                message: format!("failed to parse OpenAI response: {err}"),
            })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .ok_or_else(|| LLMError::Decoding {
                provider: NAME,
                message: "response contains no message content".to_string(),
            })?;

        let text = match content {
            MessageContent::Text(text) => text,
            MessageContent::Parts(parts) => parts.into_iter().filter_map(|p| p.text).collect(),
        };
        if text.is_empty() {
            return Err(LLMError::Decoding {
                provider: NAME,
                message: "response message content is empty".to_string(),
            });
        }
        Ok(text)
    }

    fn error_message(&self, body: &[u8]) -> Option<String> {
        error_envelope_message(body)
    }
}
