use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{CancelCause, LLMError};

/// Cancellation scope handed to every generation call.
///
/// Combines a [`CancellationToken`] with an optional deadline. Clones share the same token,
/// so cancelling any clone stops every call using it.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// Context that is never cancelled unless [`CallContext::cancel`] is called.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing token, e.g. an application shutdown token.
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Sets an absolute deadline, keeping the earlier one if already set.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        });
        self
    }

    /// Sets a deadline relative to now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derives a context that is cancelled with this one but can be cancelled on its own.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the cancellation error if the context is already done.
    pub fn err(&self) -> Option<LLMError> {
        if self.token.is_cancelled() {
            return Some(LLMError::Cancelled(CancelCause::Cancelled));
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                Some(LLMError::Cancelled(CancelCause::DeadlineExceeded))
            }
            _ => None,
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> LLMError {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => LLMError::Cancelled(CancelCause::Cancelled),
                    _ = tokio::time::sleep_until(deadline) => {
                        LLMError::Cancelled(CancelCause::DeadlineExceeded)
                    }
                }
            }
            None => {
                self.token.cancelled().await;
                LLMError::Cancelled(CancelCause::Cancelled)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_is_visible_through_clones() {
        let ctx = CallContext::new();
        let clone = ctx.clone();
        assert!(ctx.err().is_none());

        clone.cancel();
        assert!(matches!(
            ctx.err(),
            Some(LLMError::Cancelled(CancelCause::Cancelled))
        ));
        assert!(matches!(
            ctx.done().await,
            LLMError::Cancelled(CancelCause::Cancelled)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_resolves_done() {
        let ctx = CallContext::new().with_timeout(Duration::from_millis(50));
        let err = ctx.done().await;
        assert!(matches!(err, LLMError::Cancelled(CancelCause::DeadlineExceeded)));
        assert!(ctx.err().is_some());
    }

    #[tokio::test]
    async fn child_cancellation_does_not_reach_parent() {
        let parent = CallContext::new();
        let child = parent.child();
        child.cancel();
        assert!(parent.err().is_none());

        let other_child = parent.child();
        parent.cancel();
        assert!(other_child.err().is_some());
    }

    #[test]
    fn with_deadline_keeps_earliest() {
        let now = Instant::now();
        let ctx = CallContext::new()
            .with_deadline(now + Duration::from_secs(5))
            .with_deadline(now + Duration::from_secs(10));
        assert_eq!(ctx.deadline(), Some(now + Duration::from_secs(5)));
    }
}
