//! Side-by-side comparison of several provider configurations.
//!
//! [`compare`] runs one task per [`Config`] and collects exactly one
//! [`ComparisonResult`] per config, whatever happens to the individual backends.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::config::Config;
use crate::context::CallContext;
use crate::engine::build_llm;
use crate::error::LLMError;
use crate::logging::DynLogger;
use crate::prompt::Prompt;
use crate::provider::ProviderRegistry;

const RULE_WIDTH: usize = 40;

/// Outcome of one configuration in a comparison run.
#[derive(Debug)]
pub struct ComparisonResult {
    pub provider: String,
    pub model: String,
    pub outcome: Result<String, LLMError>,
}

impl ComparisonResult {
    pub fn response(&self) -> Option<&str> {
        self.outcome.as_deref().ok()
    }

    pub fn error(&self) -> Option<&LLMError> {
        self.outcome.as_ref().err()
    }
}

/// Sends `prompt` to every configuration concurrently.
///
/// Results arrive in completion order. Construction and generation failures are captured
/// per config; the call itself never fails and returns only after every config reported.
/// Each engine filters at its own [`Config::log_level`] and never changes the level of the
/// shared `logger`.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use hikaku_llm::compare::{compare, print_comparison_results};
/// use hikaku_llm::config::Config;
/// use hikaku_llm::context::CallContext;
/// use hikaku_llm::http::reqwest::default_dyn_transport;
/// use hikaku_llm::logging::TracingLogger;
/// use hikaku_llm::prompt::Prompt;
/// use hikaku_llm::provider::ProviderRegistry;
///
/// # async fn run() -> Result<(), hikaku_llm::LLMError> {
/// let registry = Arc::new(ProviderRegistry::with_defaults(default_dyn_transport()?));
/// let prompt = Arc::new(Prompt::new("Explain ownership").with_directive("one sentence"));
/// let results = compare(
///     &CallContext::new(),
///     prompt,
///     registry,
///     Arc::new(TracingLogger::default()),
///     vec![Config::new("ollama", "llama3"), Config::new("ollama", "mistral")],
/// )
/// .await;
/// print_comparison_results(&results);
/// # Ok(())
/// # }
/// ```
pub async fn compare(
    ctx: &CallContext,
    prompt: Arc<Prompt>,
    registry: Arc<ProviderRegistry>,
    logger: DynLogger,
    configs: Vec<Config>,
) -> Vec<ComparisonResult> {
    let expected = configs.len();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut tasks = JoinSet::new();
    let mut labels = HashMap::with_capacity(expected);

    for config in configs {
        let tx = tx.clone();
        let ctx = ctx.clone();
        let prompt = Arc::clone(&prompt);
        let registry = Arc::clone(&registry);
        let logger = Arc::clone(&logger);
        let label = (config.provider.clone(), config.model.clone());

        let handle = tasks.spawn(async move {
            let result = run_one(&ctx, &prompt, &registry, logger, &config).await;
            // the receiver outlives every task
            let _ = tx.send(result);
        });
        labels.insert(handle.id(), label);
    }
    drop(tx);

    let mut results = Vec::with_capacity(expected);
    while let Some(joined) = tasks.join_next_with_id().await {
        while let Ok(result) = rx.try_recv() {
            results.push(result);
        }
        if let Err(err) = joined {
            if let Some((provider, model)) = labels.remove(&err.id()) {
                logger.error(
                    "Comparison task failed",
                    &[("provider", &provider), ("model", &model), ("error", &err.to_string())],
                );
                results.push(ComparisonResult {
                    provider,
                    model,
                    outcome: Err(LLMError::Unknown {
                        message: format!("comparison task failed: {err}"),
                    }),
                });
            }
        }
    }
    while let Ok(result) = rx.try_recv() {
        results.push(result);
    }

    results
}

async fn run_one(
    ctx: &CallContext,
    prompt: &Prompt,
    registry: &ProviderRegistry,
    logger: DynLogger,
    config: &Config,
) -> ComparisonResult {
    let provider = config.provider.clone();
    let model = config.model.clone();

    let llm = match build_llm(config, logger, registry) {
        Ok(llm) => llm,
        Err(err) => {
            return ComparisonResult {
                provider,
                model,
                outcome: Err(err),
            };
        }
    };

    let outcome = llm
        .generate(ctx, prompt)
        .await
        .map(|generation| generation.text);
    ComparisonResult {
        provider,
        model,
        outcome,
    }
}

/// Renders results as plain text, one block per entry followed by a rule.
pub fn render_comparison_results(results: &[ComparisonResult]) -> String {
    let rule = "-".repeat(RULE_WIDTH);
    let mut out = String::new();
    for result in results {
        // writing into a String cannot fail
        let _ = writeln!(out, "Provider: {}, Model: {}", result.provider, result.model);
        let _ = match &result.outcome {
            Ok(response) => writeln!(out, "Response: {response}"),
            Err(err) => writeln!(out, "Error: {err}"),
        };
        out.push_str(&rule);
        out.push('\n');
    }
    out
}

/// Prints [`render_comparison_results`] to stdout.
pub fn print_comparison_results(results: &[ComparisonResult]) {
    print!("{}", render_comparison_results(results));
}
