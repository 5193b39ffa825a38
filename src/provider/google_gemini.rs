use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::error::LLMError;

use super::{Options, Provider, encode_json, error_envelope_message};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const NAME: &str = "google_gemini";

/// Option keys renamed into Gemini's camelCase `generationConfig`.
const RENAMED_OPTIONS: [(&str, &str); 4] = [
    ("max_tokens", "maxOutputTokens"),
    ("top_p", "topP"),
    ("top_k", "topK"),
    ("stop", "stopSequences"),
];

/// GenerateContentResponse 顶层结构
#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

/// Google Gemini GenerateContent provider implementation.
pub struct GoogleGeminiProvider {
    base_url: String,
    api_key: String,
    model: String,
}

impl GoogleGeminiProvider {
    /// Creates a provider that targets the default Google Generative Language endpoint.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Overrides the base URL, making it easier to point at proxies or compatibility layers.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

fn normalize_model(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

fn generation_config(options: &Options) -> Map<String, Value> {
    let mut config = Map::new();
    for (key, value) in options {
        let renamed = RENAMED_OPTIONS
            .iter()
            .find(|(from, _)| *from == key.as_str())
            .map_or(key.as_str(), |(_, to)| *to);
        config.insert(renamed.to_string(), value.clone());
    }
    config
}

impl Provider for GoogleGeminiProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let model_path = normalize_model(&self.model);
        if base.ends_with("/v1beta") {
            format!("{base}/{model_path}:generateContent")
        } else {
            format!("{base}/v1beta/{model_path}:generateContent")
        }
    }

    fn headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert("x-goog-api-key".to_string(), self.api_key.clone());
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers.insert("Accept".to_string(), "application/json".to_string());
        headers
    }

    /// Options become `generationConfig` entries, snake_case keys mapped to Gemini names.
    fn prepare_request(&self, prompt: &str, options: &Options) -> Result<Vec<u8>, LLMError> {
        let mut body = Map::new();
        body.insert(
            "contents".to_string(),
            json!([{ "role": "user", "parts": [{ "text": prompt }] }]),
        );
        let config = generation_config(options);
        if !config.is_empty() {
            body.insert("generationConfig".to_string(), Value::Object(config));
        }
        encode_json(NAME, &Value::Object(body))
    }

    fn parse_response(&self, body: &[u8]) -> Result<String, LLMError> {
        let parsed: GenerateContentResponse =
            serde_json::from_slice(body).map_err(|err| LLMError::Decoding {
                provider: NAME,
                message: format!("failed to parse Gemini response: {err}"),
            })?;

        let parts = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| content.parts)
            .unwrap_or_default();
        let text: String = parts.into_iter().filter_map(|part| part.text).collect();
        if text.is_empty() {
            return Err(LLMError::Decoding {
                provider: NAME,
                message: "first candidate contains no text".to_string(),
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

    fn provider() -> GoogleGeminiProvider {
        GoogleGeminiProvider::new("g-key", "gemini-2.0-flash")
    }

    #[test]
    fn endpoint_embeds_model_path() {
        assert_eq!(
            provider().endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
        );
        let custom = GoogleGeminiProvider::new("k", "models/gemini-pro")
            .with_base_url("http://proxy.local/v1beta/");
        assert_eq!(
            custom.endpoint(),
            "http://proxy.local/v1beta/models/gemini-pro:generateContent"
        );
        assert_eq!(provider().headers()["x-goog-api-key"], "g-key");
    }

    #[test]
    fn prepare_request_maps_options_into_generation_config() {
        let mut options = Options::new();
        options.insert("temperature".to_string(), json!(0.7));
        options.insert("max_tokens".to_string(), json!(512));
        options.insert("candidateCount".to_string(), json!(1));

        let body: Value =
            serde_json::from_slice(&provider().prepare_request("Hi", &options).unwrap()).unwrap();
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Hi");
        let config = &body["generationConfig"];
        assert_eq!(config["temperature"].as_f64(), Some(0.7));
        assert_eq!(config["maxOutputTokens"], 512);
        assert_eq!(config["candidateCount"], 1);
        assert!(config.get("max_tokens").is_none());
    }

    #[test]
    fn prepare_request_omits_empty_generation_config() {
        let body: Value =
            serde_json::from_slice(&provider().prepare_request("Hi", &Options::new()).unwrap())
                .unwrap();
        assert!(body.get("generationConfig").is_none());
    }

    #[test]
    fn parse_response_joins_first_candidate_parts() {
        let body = br#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hel"},{"text":"lo"}]},"finishReason":"STOP"}]}"#;
        assert_eq!(provider().parse_response(body).unwrap(), "Hello");
    }

    #[test]
    fn parse_response_rejects_blocked_prompt() {
        let body = br#"{"promptFeedback":{"blockReason":"SAFETY"}}"#;
        assert!(matches!(
            provider().parse_response(body),
            Err(LLMError::Decoding { provider: "google_gemini", .. })
        ));
    }
}
