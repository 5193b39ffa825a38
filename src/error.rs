use std::fmt;

use thiserror::Error;

/// Aggregates every failure mode exposed by the generation pipeline.
///
/// Per-attempt failures ([`LLMError::Request`], [`LLMError::Response`], [`LLMError::Api`]) are
/// recovered inside the retry loop; callers usually observe them wrapped in
/// [`LLMError::RetriesExhausted`].
#[derive(Debug, Error)]
pub enum LLMError {
    /// The request could not be built or transmitted.
    #[error("request error: {message}")]
    Request {
        message: String,
        #[source]
        source: Option<Box<LLMError>>,
    },
    /// A successful-status response body could not be read or decoded.
    #[error("response error: {message}")]
    Response {
        message: String,
        #[source]
        source: Option<Box<LLMError>>,
    },
    /// The upstream API answered with a non-success HTTP status.
    #[error("API error: status code {status}")]
    Api {
        /// HTTP status code returned by the provider.
        status: u16,
        /// Raw response body, kept verbatim for diagnostics.
        body: String,
    },
    /// The registry could not produce a provider for the requested triple.
    #[error("failed to resolve provider {provider}: {reason}")]
    ProviderResolution { provider: String, reason: String },
    /// A provider failed to serialize its request payload.
    #[error("failed to encode {provider} request: {message}")]
    Encoding {
        provider: &'static str,
        message: String,
    },
    /// A provider failed to decode a response payload.
    #[error("failed to decode {provider} response: {message}")]
    Decoding {
        provider: &'static str,
        message: String,
    },
    /// The call context was cancelled or its deadline passed.
    #[error("{0}")]
    Cancelled(CancelCause),
    /// Every attempt failed; wraps the error of the last one.
    #[error("failed to generate after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<LLMError>,
    },
    /// Raised when building or validating configuration fails.
    #[error("invalid configuration for {field}: {reason}")]
    InvalidConfig {
        /// Name of the configuration field that failed validation.
        field: String,
        /// Additional context explaining why the field is invalid.
        reason: String,
    },
    /// Catches opaque or unexpected failures.
    #[error("unknown error: {message}")]
    Unknown { message: String },
}

/// Why a [`crate::context::CallContext`] stopped a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCause {
    Cancelled,
    DeadlineExceeded,
}

impl fmt::Display for CancelCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelCause::Cancelled => f.write_str("context canceled"),
            CancelCause::DeadlineExceeded => f.write_str("context deadline exceeded"),
        }
    }
}

impl LLMError {
    /// Creates an [`LLMError::Request`] from a textual description.
    ///
    /// # Examples
    ///
    /// ```
    /// use hikaku_llm::error::LLMError;
    ///
    /// let err = LLMError::request("connection refused");
    /// assert!(matches!(err, LLMError::Request { .. }));
    /// ```
    pub fn request<T: Into<String>>(message: T) -> Self {
        Self::Request {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an [`LLMError::Request`] that wraps an underlying cause.
    pub fn request_caused_by<T: Into<String>>(message: T, cause: LLMError) -> Self {
        Self::Request {
            message: message.into(),
            source: Some(Box::new(cause)),
        }
    }

    /// Creates an [`LLMError::Response`] from a textual description.
    pub fn response<T: Into<String>>(message: T) -> Self {
        Self::Response {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an [`LLMError::Response`] that wraps an underlying cause.
    pub fn response_caused_by<T: Into<String>>(message: T, cause: LLMError) -> Self {
        Self::Response {
            message: message.into(),
            source: Some(Box::new(cause)),
        }
    }

    /// Creates an [`LLMError::ProviderResolution`] for the given provider name.
    ///
    /// # Examples
    ///
    /// ```
    /// use hikaku_llm::error::LLMError;
    ///
    /// let err = LLMError::resolution("mystery", "unknown provider");
    /// assert_eq!(err.to_string(), "failed to resolve provider mystery: unknown provider");
    /// ```
    pub fn resolution<P: Into<String>, R: Into<String>>(provider: P, reason: R) -> Self {
        Self::ProviderResolution {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` when the error stems from a cancelled or expired call context.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, LLMError::Cancelled(_))
    }

    /// HTTP status carried by this error or by the error it wraps.
    pub fn status(&self) -> Option<u16> {
        match self {
            LLMError::Api { status, .. } => Some(*status),
            LLMError::RetriesExhausted { source, .. } => source.status(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn retries_exhausted_reports_attempts_and_cause() {
        let err = LLMError::RetriesExhausted {
            attempts: 3,
            source: Box::new(LLMError::request("failed to send request")),
        };
        assert_eq!(
            err.to_string(),
            "failed to generate after 3 attempts: request error: failed to send request"
        );
        let source = err.source().expect("source");
        assert_eq!(source.to_string(), "request error: failed to send request");
    }

    #[test]
    fn status_is_found_through_aggregate() {
        let err = LLMError::RetriesExhausted {
            attempts: 2,
            source: Box::new(LLMError::Api {
                status: 503,
                body: "busy".to_string(),
            }),
        };
        assert_eq!(err.status(), Some(503));
        assert_eq!(LLMError::request("x").status(), None);
    }

    #[test]
    fn cancellation_messages_distinguish_cause() {
        assert_eq!(
            LLMError::Cancelled(CancelCause::Cancelled).to_string(),
            "context canceled"
        );
        assert_eq!(
            LLMError::Cancelled(CancelCause::DeadlineExceeded).to_string(),
            "context deadline exceeded"
        );
        assert!(LLMError::Cancelled(CancelCause::Cancelled).is_cancellation());
    }
}
