//! # Cancellation handle shared by all components.
//!
//! [`Context`] couples a [`CancellationToken`] with an optional deadline. It
//! is the handle every blocking operation in this crate takes: the retry
//! engine races its sleeps against it, the signaller races its enqueues and
//! acknowledgement waits against it, and state functions can poll it between
//! steps.
//!
//! Cancellation is cooperative. Cancelling a context never interrupts code
//! that is already running; it is observed at the next suspension point or
//! explicit check.
//!
//! ```
//! use std::time::Duration;
//! use opskit::Context;
//!
//! let ctx = Context::with_timeout(Duration::from_secs(5));
//! let child = ctx.child();
//!
//! ctx.cancel();
//! assert!(child.is_cancelled());
//! ```

use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a context stopped being live.
///
/// These are the two well-known cancellation sentinels. Error chains that
/// contain either of them are considered cancellation failures by
/// [`is_cancel`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CancelError {
    /// The context was cancelled explicitly (or by a parent).
    #[error("context cancelled")]
    Cancelled,

    /// The context's deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Cancellation handle with an optional deadline.
///
/// Cheap to clone; clones share the same token, so cancelling any of them
/// cancels all. Use [`Context::child`] for hierarchical cancellation where
/// the child can be cancelled without affecting the parent.
#[derive(Debug, Clone)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Creates a live context with no deadline.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Creates a context whose deadline is `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Creates a context with an absolute deadline.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// Returns a child context: cancelling the parent cancels the child, but
    /// cancelling the child leaves the parent live. The deadline is
    /// inherited.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Tightens the deadline; `None` leaves it unset.
    ///
    /// A deadline can only move earlier: if one is already set, the earlier
    /// of the two wins.
    pub fn deadline_at(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(d) => d.min(deadline),
            None => deadline,
        });
        self
    }

    /// The deadline, if one is set.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancels this context and all contexts sharing or derived from its
    /// token.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// True if the token has been cancelled.
    ///
    /// Does not consider the deadline; use [`Context::error`] for the full
    /// check.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Returns the reason this context is no longer live, or `None` if it
    /// still is.
    pub fn error(&self) -> Option<CancelError> {
        if self.token.is_cancelled() {
            return Some(CancelError::Cancelled);
        }
        match self.deadline {
            Some(d) if Instant::now() >= d => Some(CancelError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves when the context stops being live, with the reason.
    ///
    /// Pending forever on a context with no deadline that is never
    /// cancelled.
    pub async fn cancelled(&self) -> CancelError {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => CancelError::Cancelled,
                    _ = tokio::time::sleep_until(deadline) => CancelError::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                CancelError::Cancelled
            }
        }
    }
}

/// True if `err` or anything in its cause chain is a [`CancelError`].
pub fn is_cancel(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut cur: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = cur {
        if e.downcast_ref::<CancelError>().is_some() {
            return true;
        }
        cur = e.source();
    }
    false
}
