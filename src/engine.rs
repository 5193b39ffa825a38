//! Retrying generation engine.
//!
//! [`build_llm`] turns a [`Config`] into a ready [`LLM`]: the local Ollama provider is
//! returned as-is, every other provider is wrapped in [`RetryingLLM`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::config::Config;
use crate::context::CallContext;
use crate::error::LLMError;
use crate::http::{DynHttpTransport, HttpRequest, HttpTransport};
use crate::logging::{DynLogger, LogLevel, Logger, ScopedLogger};
use crate::prompt::Prompt;
use crate::provider::{Options, Provider, ProviderRegistry, ResolvedProvider};

/// Successful outcome of [`LLM::generate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    /// Text produced by the model.
    pub text: String,
    /// Prompt exactly as it was sent.
    pub rendered_prompt: String,
}

/// A configured model that turns prompts into text.
#[async_trait]
pub trait LLM: Send + Sync {
    /// Renders the prompt and asks the backend for a completion.
    ///
    /// # Errors
    ///
    /// Returns [`LLMError::Cancelled`] when `ctx` stops the call, otherwise the failure of the
    /// backend exchange (wrapped in [`LLMError::RetriesExhausted`] for retrying engines).
    async fn generate(&self, ctx: &CallContext, prompt: &Prompt) -> Result<Generation, LLMError>;

    /// Stores an option sent with every subsequent request.
    fn set_option(&mut self, key: &str, value: Value);

    /// Changes the verbosity of this model's logger.
    fn set_debug_level(&mut self, level: LogLevel);

    /// Rebinds the backend base URL where the backend supports it.
    fn set_endpoint(&mut self, endpoint: &str);
}

/// Builds the [`LLM`] described by `config`.
///
/// The engine logs through a [`ScopedLogger`] over `logger` at [`Config::log_level`], so the
/// shared sink's own level is never changed. Sampling settings become the
/// `temperature` and `max_tokens` options of remote providers.
///
/// # Errors
///
/// Returns [`LLMError::ProviderResolution`] when the registry has no matching provider or
/// rejects the API key.
pub fn build_llm(
    config: &Config,
    logger: DynLogger,
    registry: &ProviderRegistry,
) -> Result<Box<dyn LLM>, LLMError> {
    let resolved = registry.get(&config.provider, config.api_key(), &config.model)?;
    let logger: DynLogger = Arc::new(ScopedLogger::new(logger, config.log_level));

    match resolved {
        ResolvedProvider::Local(mut provider) => {
            if let Some(endpoint) = config.ollama_endpoint.as_deref().filter(|e| !e.is_empty()) {
                provider.set_endpoint(endpoint);
            }
            Ok(Box::new(
                provider.with_logger(logger).with_timeout(config.timeout),
            ))
        }
        ResolvedProvider::Remote(provider) => {
            let mut llm = RetryingLLM::new(provider, registry.transport(), logger)
                .with_timeout(config.timeout)
                .with_max_retries(config.max_retries)
                .with_retry_delay(config.retry_delay);
            llm.set_option("temperature", json!(config.temperature));
            llm.set_option("max_tokens", json!(config.max_tokens));
            Ok(Box::new(llm))
        }
    }
}

/// Wraps a [`Provider`] with a fixed-delay retry loop.
///
/// A budget of `max_retries = r` means up to `r + 1` request/response cycles.
pub struct RetryingLLM {
    provider: Box<dyn Provider>,
    transport: DynHttpTransport,
    logger: DynLogger,
    options: Options,
    timeout: Option<Duration>,
    max_retries: u32,
    retry_delay: Duration,
}

impl RetryingLLM {
    /// Creates an engine with the default retry budget and no request timeout.
    pub fn new(provider: Box<dyn Provider>, transport: DynHttpTransport, logger: DynLogger) -> Self {
        let defaults = Config::default();
        Self {
            provider,
            transport,
            logger,
            options: Options::new(),
            timeout: None,
            max_retries: defaults.max_retries,
            retry_delay: defaults.retry_delay,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
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

    pub fn provider(&self) -> &dyn Provider {
        self.provider.as_ref()
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }
}

#[async_trait]
impl LLM for RetryingLLM {
    async fn generate(&self, ctx: &CallContext, prompt: &Prompt) -> Result<Generation, LLMError> {
        let rendered = prompt.render();
        let name = self.provider.name();
        let attempts = self.max_retries.saturating_add(1);
        let mut last_err = None;

        for attempt in 1..=attempts {
            self.logger.debug(
                "Generating text",
                &[("provider", &name), ("prompt", &rendered), ("attempt", &attempt)],
            );

            let outcome = run_attempt(Attempt {
                ctx,
                provider: self.provider.as_ref(),
                transport: self.transport.as_ref(),
                logger: self.logger.as_ref(),
                prompt: &rendered,
                options: &self.options,
                timeout: self.timeout,
            })
            .await;

            match outcome {
                Ok(text) => {
                    return Ok(Generation {
                        text,
                        rendered_prompt: rendered,
                    });
                }
                Err(err) if err.is_cancellation() => return Err(err),
                Err(err) => {
                    self.logger.warn(
                        "Generation attempt failed",
                        &[("error", &err.to_string()), ("attempt", &attempt)],
                    );
                    last_err = Some(err);
                }
            }

            if attempt < attempts {
                self.logger.debug("Retrying", &[("delay", &self.retry_delay)]);
                tokio::select! {
                    biased;
                    err = ctx.done() => return Err(err),
                    _ = tokio::time::sleep(self.retry_delay) => {}
                }
            }
        }

        let source = last_err.unwrap_or_else(|| LLMError::Unknown {
            message: "no generation attempt was made".to_string(),
        });
        Err(LLMError::RetriesExhausted {
            attempts,
            source: Box::new(source),
        })
    }

    fn set_option(&mut self, key: &str, value: Value) {
        self.logger
            .debug("Option set", &[("key", &key), ("value", &value)]);
        self.options.insert(key.to_string(), value);
    }

    fn set_debug_level(&mut self, level: LogLevel) {
        self.logger
            .debug("Setting internal LLM debug level", &[("new_level", &level)]);
        self.logger.set_level(level);
    }

    fn set_endpoint(&mut self, endpoint: &str) {
        // only the local provider has a mutable base URL
        self.logger.debug(
            "Ignoring endpoint override for provider without mutable endpoint",
            &[("provider", &self.provider.name()), ("endpoint", &endpoint)],
        );
    }
}

/// Everything one request/response cycle needs.
pub(crate) struct Attempt<'a> {
    pub ctx: &'a CallContext,
    pub provider: &'a dyn Provider,
    pub transport: &'a dyn HttpTransport,
    pub logger: &'a dyn Logger,
    pub prompt: &'a str,
    pub options: &'a Options,
    pub timeout: Option<Duration>,
}

/// Runs a single request/response cycle.
///
/// The HTTP exchange is raced against the context so a cancelled call returns promptly.
pub(crate) async fn run_attempt(attempt: Attempt<'_>) -> Result<String, LLMError> {
    let Attempt {
        ctx,
        provider,
        transport,
        logger,
        prompt,
        options,
        timeout,
    } = attempt;
    let name = provider.name();

    let body = provider
        .prepare_request(prompt, options)
        .map_err(|err| LLMError::request_caused_by("failed to prepare request", err))?;
    logger.debug(
        "Request body",
        &[("provider", &name), ("body", &String::from_utf8_lossy(&body))],
    );

    let headers = provider.headers();
    for (key, value) in &headers {
        logger.debug(
            "Request header",
            &[("provider", &name), ("key", key), ("value", &masked(key, value))],
        );
    }

    let mut request = HttpRequest::post_json(provider.endpoint(), body).with_headers(headers);
    if let Some(timeout) = timeout {
        request = request.with_timeout(timeout);
    }

    let response = tokio::select! {
        biased;
        err = ctx.done() => return Err(err),
        result = transport.send(request) => result.map_err(into_transport_error)?,
    };

    if !response.is_success() {
        let body = response.body_text();
        let message = provider.error_message(&response.body);
        logger.error(
            "API error",
            &[
                ("provider", &name),
                ("status", &response.status),
                ("body", &body),
                ("message", &message),
            ],
        );
        return Err(LLMError::Api {
            status: response.status,
            body,
        });
    }

    let text = provider
        .parse_response(&response.body)
        .map_err(|err| LLMError::response_caused_by("failed to parse response", err))?;
    logger.debug(
        "Text generated successfully",
        &[("provider", &name), ("result", &text)],
    );
    Ok(text)
}

fn into_transport_error(err: LLMError) -> LLMError {
    match err {
        LLMError::Request { .. } | LLMError::Response { .. } | LLMError::Cancelled(_) => err,
        other => LLMError::request_caused_by("failed to send request", other),
    }
}

const SECRET_HEADERS: [&str; 3] = ["authorization", "x-api-key", "x-goog-api-key"];

/// Hides credentials in logged header values, keeping a short prefix.
fn masked(key: &str, value: &str) -> String {
    if !SECRET_HEADERS.iter().any(|h| key.eq_ignore_ascii_case(h)) {
        return value.to_string();
    }
    let prefix: String = value.chars().take(4).collect();
    format!("{prefix}****")
}
