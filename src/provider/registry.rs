use std::collections::HashMap;
use std::sync::Arc;

use crate::error::LLMError;
use crate::http::DynHttpTransport;

use super::anthropic_messages::AnthropicMessagesProvider;
use super::google_gemini::GoogleGeminiProvider;
use super::ollama::OllamaProvider;
use super::openai_chat::OpenAiChatProvider;
use super::{ResolvedProvider, require_api_key};

/// Builds a provider from `(api_key, model, transport)`.
pub type ProviderFactory =
    Arc<dyn Fn(&str, &str, DynHttpTransport) -> Result<ResolvedProvider, LLMError> + Send + Sync>;

/// 按名称解析 Provider 的注册表
///
/// # Examples
///
/// ```
/// use hikaku_llm::http::reqwest::default_dyn_transport;
/// use hikaku_llm::provider::{ProviderRegistry, ResolvedProvider};
///
/// let registry = ProviderRegistry::with_defaults(default_dyn_transport().unwrap());
/// let resolved = registry.get("ollama", "", "llama3").unwrap();
/// assert!(matches!(resolved, ResolvedProvider::Local(_)));
/// assert!(registry.get("nonexistent", "key", "m").is_err());
/// ```
#[derive(Clone)]
pub struct ProviderRegistry {
    transport: DynHttpTransport,
    factories: HashMap<String, ProviderFactory>,
}

impl ProviderRegistry {
    /// 创建空注册表
    pub fn new(transport: DynHttpTransport) -> Self {
        Self {
            transport,
            factories: HashMap::new(),
        }
    }

    /// Registry preloaded with `ollama`, `openai_chat`, `anthropic_messages` and
    /// `google_gemini`.
    pub fn with_defaults(transport: DynHttpTransport) -> Self {
        Self::new(transport)
            .register("ollama", |_api_key, model, transport| {
                Ok(ResolvedProvider::Local(OllamaProvider::new(transport, model)))
            })
            .register("openai_chat", |api_key, model, _transport| {
                let key = require_api_key("openai_chat", api_key)?;
                Ok(ResolvedProvider::Remote(Box::new(OpenAiChatProvider::new(
                    key, model,
                ))))
            })
            .register("anthropic_messages", |api_key, model, _transport| {
                let key = require_api_key("anthropic_messages", api_key)?;
                Ok(ResolvedProvider::Remote(Box::new(
                    AnthropicMessagesProvider::new(key, model),
                )))
            })
            .register("google_gemini", |api_key, model, _transport| {
                let key = require_api_key("google_gemini", api_key)?;
                Ok(ResolvedProvider::Remote(Box::new(GoogleGeminiProvider::new(
                    key, model,
                ))))
            })
    }

    /// 注册一个名称对应的 Provider 构造函数 同名时覆盖
    pub fn register<S, F>(mut self, name: S, factory: F) -> Self
    where
        S: Into<String>,
        F: Fn(&str, &str, DynHttpTransport) -> Result<ResolvedProvider, LLMError>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    /// Resolves `name` into a provider bound to `api_key` and `model`.
    ///
    /// # Errors
    ///
    /// Returns [`LLMError::ProviderResolution`] for unknown names and whatever the factory
    /// reports, typically a missing API key.
    pub fn get(&self, name: &str, api_key: &str, model: &str) -> Result<ResolvedProvider, LLMError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| LLMError::resolution(name, format!("unknown provider: {name}")))?;
        factory(api_key, model, self.transport.clone())
    }

    /// Transport shared by every provider and engine built from this registry.
    pub fn transport(&self) -> DynHttpTransport {
        self.transport.clone()
    }

    /// 返回当前已注册的名称
    pub fn names(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::reqwest::default_dyn_transport;

    fn registry() -> ProviderRegistry {
        ProviderRegistry::with_defaults(default_dyn_transport().expect("transport"))
    }

    #[test]
    fn with_defaults_registers_all_backends() {
        let mut names = registry().names();
        names.sort();
        assert_eq!(
            names,
            vec![
                "anthropic_messages".to_string(),
                "google_gemini".to_string(),
                "ollama".to_string(),
                "openai_chat".to_string(),
            ]
        );
    }

    #[test]
    fn get_resolves_remote_providers_with_keys() {
        let registry = registry();
        for name in ["openai_chat", "anthropic_messages", "google_gemini"] {
            let resolved = registry.get(name, "test-key", "some-model").expect(name);
            assert!(matches!(resolved, ResolvedProvider::Remote(_)));
            assert_eq!(resolved.name(), name);
        }
    }

    #[test]
    fn get_rejects_unknown_names() {
        let err = registry().get("mystery", "key", "model").err().expect("error");
        match err {
            LLMError::ProviderResolution { provider, reason } => {
                assert_eq!(provider, "mystery");
                assert!(reason.contains("unknown provider"));
            }
            other => panic!("unexpected error type: {other:?}"),
        }
    }

    #[test]
    fn get_requires_key_for_remote_providers() {
        let err = registry().get("openai_chat", "", "gpt-4.1-mini").err().expect("error");
        assert!(matches!(err, LLMError::ProviderResolution { .. }));
    }

    #[test]
    fn register_overrides_existing_name() {
        let registry = registry().register("ollama", |_key, model, transport| {
            Ok(ResolvedProvider::Local(
                OllamaProvider::new(transport, model).with_base_url("http://gpu-box:11434"),
            ))
        });
        match registry.get("ollama", "", "llama3").expect("resolved") {
            ResolvedProvider::Local(provider) => {
                assert_eq!(provider.base_url(), "http://gpu-box:11434");
                assert_eq!(provider.model(), "llama3");
            }
            ResolvedProvider::Remote(_) => panic!("expected local provider"),
        }
    }
}
