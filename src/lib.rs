//! 多 LLM 后端统一调用与对比库
//!
//! Build a [`Prompt`], resolve a backend through [`ProviderRegistry`], and either call it
//! through [`build_llm`] or fan the same prompt out to several configurations with
//! [`compare`].

pub mod compare;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod http;
pub mod logging;
pub mod prompt;
pub mod provider;

pub use compare::{ComparisonResult, compare, print_comparison_results, render_comparison_results};
pub use config::Config;
pub use context::CallContext;
pub use engine::{Generation, LLM, RetryingLLM, build_llm};
pub use error::{CancelCause, LLMError};
pub use logging::{DynLogger, LogLevel, Logger, NoopLogger, ScopedLogger, TracingLogger, init_tracing};
pub use prompt::{Prompt, PromptSection, SectionKind};
pub use provider::{OllamaProvider, Provider, ProviderRegistry, ResolvedProvider};
