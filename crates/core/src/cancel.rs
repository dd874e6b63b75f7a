//! Cancellation and deadlines
//!
//! Every long-running operation (scans, compaction, view refresh) accepts a
//! `CancelContext` and polls it at its check points. Commit is the one
//! operation that stops checking once the table guard is held — atomicity
//! outranks responsiveness there.

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token in the not-cancelled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent; observed at the next check point.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Cancellation token plus optional deadline, threaded through long
/// operations.
#[derive(Debug, Clone, Default)]
pub struct CancelContext {
    token: Option<CancelToken>,
    deadline: Option<Instant>,
}

impl CancelContext {
    /// A context that never cancels. Used by internal maintenance paths.
    pub fn none() -> Self {
        Self::default()
    }

    /// A context observing `token`.
    pub fn with_token(token: CancelToken) -> Self {
        Self {
            token: Some(token),
            deadline: None,
        }
    }

    /// A context expiring `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            token: None,
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Attach a deadline to this context.
    pub fn deadline(mut self, at: Instant) -> Self {
        self.deadline = Some(at);
        self
    }

    /// Poll for cancellation or expiry.
    ///
    /// # Errors
    ///
    /// `Cancelled` if the token fired, `DeadlineExceeded` if the deadline
    /// passed. Callers release staged work and surface the error.
    pub fn check(&self) -> Result<()> {
        if let Some(token) = &self.token {
            if token.is_cancelled() {
                return Err(Error::Cancelled);
            }
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(Error::DeadlineExceeded);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_never_cancels() {
        let ctx = CancelContext::none();
        for _ in 0..3 {
            assert!(ctx.check().is_ok());
        }
    }

    #[test]
    fn token_cancellation_observed() {
        let token = CancelToken::new();
        let ctx = CancelContext::with_token(token.clone());
        assert!(ctx.check().is_ok());
        token.cancel();
        assert!(matches!(ctx.check(), Err(Error::Cancelled)));
        // Idempotent.
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn expired_deadline_observed() {
        let ctx = CancelContext::none().deadline(Instant::now() - Duration::from_millis(1));
        assert!(matches!(ctx.check(), Err(Error::DeadlineExceeded)));
    }

    #[test]
    fn future_deadline_passes() {
        let ctx = CancelContext::with_timeout(Duration::from_secs(60));
        assert!(ctx.check().is_ok());
    }

    #[test]
    fn token_is_shared_across_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
