//! Leveled logging sink consumed by the generation engine.
//!
//! The engine only talks to the [`Logger`] trait. [`TracingLogger`] forwards to `tracing`
//! and keeps its own runtime-adjustable threshold so `set_level` works even when the global
//! subscriber is static.

use std::fmt::{self, Write as _};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::LLMError;

/// Verbosity threshold, ordered from most to least verbose.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_u8(self) -> u8 {
        self as u8
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => LogLevel::Debug,
            1 => LogLevel::Info,
            2 => LogLevel::Warn,
            _ => LogLevel::Error,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = LLMError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "debug" | "trace" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(LLMError::InvalidConfig {
                field: "log_level".to_string(),
                reason: format!("unknown level `{other}`"),
            }),
        }
    }
}

/// Key/value pairs attached to a log line.
pub type Fields<'a> = &'a [(&'a str, &'a dyn fmt::Debug)];

/// Leveled sink. Implementations must never panic or fail.
pub trait Logger: Send + Sync {
    fn log(&self, level: LogLevel, message: &str, fields: Fields<'_>);

    /// Adjusts verbosity at runtime.
    fn set_level(&self, level: LogLevel);

    /// Writes a line that an outer filter already accepted, bypassing this sink's own level.
    fn emit(&self, level: LogLevel, message: &str, fields: Fields<'_>) {
        self.log(level, message, fields);
    }

    fn debug(&self, message: &str, fields: Fields<'_>) {
        self.log(LogLevel::Debug, message, fields);
    }

    fn info(&self, message: &str, fields: Fields<'_>) {
        self.log(LogLevel::Info, message, fields);
    }

    fn warn(&self, message: &str, fields: Fields<'_>) {
        self.log(LogLevel::Warn, message, fields);
    }

    fn error(&self, message: &str, fields: Fields<'_>) {
        self.log(LogLevel::Error, message, fields);
    }
}

/// Thread-safe logger handle.
pub type DynLogger = Arc<dyn Logger>;

/// [`Logger`] backed by `tracing` macros.
#[derive(Debug)]
pub struct TracingLogger {
    level: AtomicU8,
}

impl TracingLogger {
    pub fn new(level: LogLevel) -> Self {
        Self {
            level: AtomicU8::new(level.as_u8()),
        }
    }

    pub fn level(&self) -> LogLevel {
        LogLevel::from_u8(self.level.load(Ordering::Relaxed))
    }
}

impl Default for TracingLogger {
    fn default() -> Self {
        Self::new(LogLevel::default())
    }
}

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, message: &str, fields: Fields<'_>) {
        if level >= self.level() {
            self.emit(level, message, fields);
        }
    }

    fn set_level(&self, level: LogLevel) {
        self.level.store(level.as_u8(), Ordering::Relaxed);
    }

    fn emit(&self, level: LogLevel, message: &str, fields: Fields<'_>) {
        let rendered = render_fields(fields);
        match level {
            LogLevel::Debug => tracing::debug!(fields = %rendered, "{message}"),
            LogLevel::Info => tracing::info!(fields = %rendered, "{message}"),
            LogLevel::Warn => tracing::warn!(fields = %rendered, "{message}"),
            LogLevel::Error => tracing::error!(fields = %rendered, "{message}"),
        }
    }
}

/// Logger that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn log(&self, _level: LogLevel, _message: &str, _fields: Fields<'_>) {}

    fn set_level(&self, _level: LogLevel) {}
}

/// Per-engine view of a shared sink with its own verbosity threshold.
///
/// `set_level` only changes this view, so engines built from different configs can share one
/// sink without overwriting each other's level. Accepted lines go to [`Logger::emit`] on the
/// sink.
pub struct ScopedLogger {
    inner: DynLogger,
    level: AtomicU8,
}

impl ScopedLogger {
    pub fn new(inner: DynLogger, level: LogLevel) -> Self {
        Self {
            inner,
            level: AtomicU8::new(level.as_u8()),
        }
    }

    pub fn level(&self) -> LogLevel {
        LogLevel::from_u8(self.level.load(Ordering::Relaxed))
    }
}

impl Logger for ScopedLogger {
    fn log(&self, level: LogLevel, message: &str, fields: Fields<'_>) {
        if level >= self.level() {
            self.inner.emit(level, message, fields);
        }
    }

    fn set_level(&self, level: LogLevel) {
        self.level.store(level.as_u8(), Ordering::Relaxed);
    }
}

/// Renders fields as `key=value` pairs separated by spaces.
pub(crate) fn render_fields(fields: Fields<'_>) -> String {
    let mut out = String::new();
    for (idx, (key, value)) in fields.iter().enumerate() {
        if idx > 0 {
            out.push(' ');
        }
        // writing into a String cannot fail
        let _ = write!(out, "{key}={value:?}");
    }
    out
}

/// Installs a global `tracing` subscriber writing compact lines to stderr.
///
/// `RUST_LOG` takes precedence over `level`. Calling this more than once is harmless: later
/// calls leave the first subscriber in place.
pub fn init_tracing(level: LogLevel) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.as_str()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init();
}
