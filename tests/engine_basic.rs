use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hikaku_llm::http::{HttpRequest, HttpResponse, HttpTransport};
use hikaku_llm::{
    CallContext, CancelCause, Config, LLMError, LogLevel, NoopLogger, Prompt, ProviderRegistry,
    build_llm,
};
use serde_json::Value;

/// Records every request and answers with a fixed status and body.
struct RecordingTransport {
    status: u16,
    body: &'static str,
    delay: Duration,
    requests: Mutex<Vec<HttpRequest>>,
}

impl RecordingTransport {
    fn new(status: u16, body: &'static str) -> Arc<Self> {
        Self::delayed(status, body, Duration::ZERO)
    }

    fn delayed(status: u16, body: &'static str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            status,
            body,
            delay,
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl HttpTransport for RecordingTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, LLMError> {
        self.requests.lock().expect("requests lock").push(request);
        tokio::time::sleep(self.delay).await;
        Ok(HttpResponse {
            status: self.status,
            body: self.body.as_bytes().to_vec(),
        })
    }
}

fn body_of(request: &HttpRequest) -> Value {
    serde_json::from_slice(&request.body).expect("json body")
}

#[tokio::test]
async fn remote_provider_receives_rendered_prompt_and_sampling_options() {
    let transport = RecordingTransport::new(
        200,
        r#"{"choices":[{"message":{"role":"assistant","content":"Rust is a systems language."}}]}"#,
    );
    let registry = ProviderRegistry::with_defaults(transport.clone());
    let config = Config::new("openai_chat", "gpt-4.1-mini")
        .with_api_key("openai_chat", "sk-live-secret")
        .with_temperature(0.2)
        .with_max_tokens(128)
        .with_log_level(LogLevel::Debug);

    let llm = build_llm(&config, Arc::new(NoopLogger), &registry).expect("llm");
    let prompt = Prompt::new("Describe Rust").with_output("one sentence");
    let generation = llm
        .generate(&CallContext::new(), &prompt)
        .await
        .expect("generation");

    assert_eq!(generation.text, "Rust is a systems language.");
    assert_eq!(generation.rendered_prompt, prompt.render());

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, "https://api.openai.com/v1/chat/completions");
    assert_eq!(requests[0].headers["Authorization"], "Bearer sk-live-secret");
    assert_eq!(requests[0].timeout, Some(config.timeout));
    let body = body_of(&requests[0]);
    assert_eq!(body["messages"][0]["content"], prompt.render().as_str());
    assert_eq!(body["temperature"].as_f64(), Some(0.2));
    assert_eq!(body["max_tokens"], 128);
}

#[tokio::test]
async fn ollama_uses_configured_endpoint_and_single_attempt() {
    let transport = RecordingTransport::new(500, r#"{"error":"model not loaded"}"#);
    let registry = ProviderRegistry::with_defaults(transport.clone());
    let config = Config::new("ollama", "llama3")
        .with_ollama_endpoint("http://gpu-box:11434/")
        .with_max_retries(5);

    let llm = build_llm(&config, Arc::new(NoopLogger), &registry).expect("llm");
    let err = llm
        .generate(&CallContext::new(), &Prompt::new("Hi"))
        .await
        .expect_err("server error");

    assert!(matches!(err, LLMError::Api { status: 500, .. }));
    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, "http://gpu-box:11434/api/generate");
    let body = body_of(&requests[0]);
    assert_eq!(body["model"], "llama3");
    assert!(body.get("temperature").is_none());
}

#[tokio::test(start_paused = true)]
async fn remote_provider_retries_until_budget_is_spent() {
    let transport = RecordingTransport::new(503, r#"{"error":{"message":"overloaded"}}"#);
    let registry = ProviderRegistry::with_defaults(transport.clone());
    let config = Config::new("anthropic_messages", "claude-3-5-sonnet")
        .with_api_key("anthropic_messages", "sk-ant")
        .with_max_retries(2)
        .with_retry_delay(Duration::from_millis(250));

    let llm = build_llm(&config, Arc::new(NoopLogger), &registry).expect("llm");
    let started = tokio::time::Instant::now();
    let err = llm
        .generate(&CallContext::new(), &Prompt::new("Hi"))
        .await
        .expect_err("exhausted");

    assert_eq!(
        err.to_string(),
        "failed to generate after 3 attempts: API error: status code 503"
    );
    assert_eq!(err.status(), Some(503));
    assert_eq!(transport.requests().len(), 3);
    assert!(started.elapsed() >= Duration::from_millis(500));
}

#[tokio::test(start_paused = true)]
async fn deadline_interrupts_a_slow_backend() {
    let transport = RecordingTransport::delayed(
        200,
        "{\"response\":\"late\",\"done\":true}\n",
        Duration::from_secs(10),
    );
    let registry = ProviderRegistry::with_defaults(transport);
    let llm = build_llm(&Config::new("ollama", "llama3"), Arc::new(NoopLogger), &registry)
        .expect("llm");

    let ctx = CallContext::new().with_timeout(Duration::from_secs(1));
    let err = llm
        .generate(&ctx, &Prompt::new("Hi"))
        .await
        .expect_err("deadline");
    assert!(matches!(err, LLMError::Cancelled(CancelCause::DeadlineExceeded)));
}

#[test]
fn build_llm_rejects_remote_provider_without_key() {
    let registry = ProviderRegistry::with_defaults(RecordingTransport::new(200, "{}"));
    let err = build_llm(
        &Config::new("google_gemini", "gemini-2.0-flash"),
        Arc::new(NoopLogger),
        &registry,
    )
    .err()
    .expect("missing key");
    assert!(matches!(err, LLMError::ProviderResolution { .. }));
}

#[tokio::test]
async fn blank_completions_are_errors_not_empty_text() {
    let cases = [
        ("ollama", "llama3", r#"{"error":"model runner crashed"}"#),
        ("ollama", "llama3", r#"{"response":"","done":true}"#),
        ("openai_chat", "gpt-4.1-mini", r#"{"choices":[{"message":{"content":""}}]}"#),
        ("anthropic_messages", "claude-3-5-sonnet", r#"{"content":[{"type":"text","text":""}]}"#),
    ];

    for (provider, model, body) in cases {
        let transport = RecordingTransport::new(200, body);
        let registry = ProviderRegistry::with_defaults(transport);
        let config = Config::new(provider, model)
            .with_api_key(provider, "key")
            .with_max_retries(0);
        let llm = build_llm(&config, Arc::new(NoopLogger), &registry).expect("llm");

        let result = llm.generate(&CallContext::new(), &Prompt::new("Hi")).await;
        let err = result.expect_err(provider);
        let attempt_err = match err {
            LLMError::RetriesExhausted { attempts: 1, source } => *source,
            other => other,
        };
        match attempt_err {
            LLMError::Response { source: Some(cause), .. } => {
                assert!(
                    matches!(*cause, LLMError::Decoding { .. }),
                    "{provider}: unexpected cause {cause:?}"
                );
            }
            other => panic!("{provider}: unexpected error {other:?}"),
        }
    }
}
