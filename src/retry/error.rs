//! # Retry failure type, permanent-error marker, and transformer plumbing.
//!
//! Every failed [`Backoff::retry`](crate::retry::Backoff::retry) surfaces a
//! single [`Error`] that wraps the last operation error together with the
//! final [`Record`] and two flags:
//!
//! - `permanent`: the error was classified non-retriable;
//! - `cancelled`: the retry *loop* ended because the caller's context fired.
//!
//! The flags answer different questions than the cause chain does. An
//! operation may itself return a cancellation sentinel as its last error
//! without the loop ever being cancelled; [`Error::is_cancelled`] inspects
//! the cause chain while [`Error::cancelled`] reports the loop-level reason,
//! and the two can disagree.

use std::fmt;
use std::sync::Arc;

use crate::context::is_cancel;
use crate::retry::Record;
use crate::BoxError;

/// A caller error shared between the per-attempt [`Record`] and the final
/// [`Error`].
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Marker wrapping an error that must not be retried.
///
/// Produced by [`permanent`]; detected anywhere in a cause chain by
/// [`is_permanent`]. Displays as the wrapped error, so marking an error does
/// not change its message.
#[derive(Debug)]
pub struct Permanent(BoxError);

impl Permanent {
    /// The wrapped error.
    pub fn get_ref(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.0.as_ref()
    }
}

impl fmt::Display for Permanent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for Permanent {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.0.as_ref())
    }
}

/// Wraps `err` with the permanent marker, stopping further retries.
///
/// ```
/// use opskit::retry::{is_permanent, permanent};
///
/// let err = permanent("schema mismatch".to_string());
/// assert!(is_permanent(err.as_ref()));
/// ```
pub fn permanent(err: impl Into<BoxError>) -> BoxError {
    Box::new(Permanent(err.into()))
}

/// True if `err` or anything in its cause chain carries the permanent
/// marker.
pub fn is_permanent(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut cur: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = cur {
        if e.downcast_ref::<Permanent>().is_some() {
            return true;
        }
        if let Some(retry) = e.downcast_ref::<Error>() {
            if retry.permanent {
                return true;
            }
        }
        cur = e.source();
    }
    false
}

/// Transforms an operation error before classification.
///
/// Transformers run in order, once per attempt, on the raw error the
/// operation returned. A transformer may pass the error through, wrap it with
/// context, or wrap it with the permanent marker to stop the retry loop.
/// Closures of type `Fn(BoxError) -> BoxError` implement this trait.
pub trait ErrTransformer: Send + Sync {
    /// Maps the error; the returned value feeds the next transformer.
    fn transform(&self, err: BoxError) -> BoxError;
}

impl<F> ErrTransformer for F
where
    F: Fn(BoxError) -> BoxError + Send + Sync,
{
    fn transform(&self, err: BoxError) -> BoxError {
        self(err)
    }
}

/// The sole failure type returned by the retry engine.
#[derive(Debug)]
pub struct Error {
    source: SharedError,
    record: Record,
    pub(crate) permanent: bool,
    cancelled: bool,
}

impl Error {
    pub(crate) fn permanent_stop(source: BoxError, record: Record) -> Self {
        Self {
            source: SharedError::from(source),
            record,
            permanent: true,
            cancelled: false,
        }
    }

    pub(crate) fn cancelled_stop(source: SharedError, record: Record) -> Self {
        Self {
            source,
            record,
            permanent: false,
            cancelled: true,
        }
    }

    pub(crate) fn exhausted_stop(source: BoxError, record: Record) -> Self {
        Self {
            source: SharedError::from(source),
            record,
            permanent: false,
            cancelled: false,
        }
    }

    /// The record of the final attempt.
    pub fn record(&self) -> &Record {
        &self.record
    }

    /// True if the retry loop stopped because the context was cancelled or
    /// its deadline left no room for the next wait.
    ///
    /// The wrapped error is still whatever the last attempt returned; if that
    /// error is itself a cancellation sentinel, [`Error::is_cancelled`]
    /// reports it.
    pub fn cancelled(&self) -> bool {
        self.cancelled
    }

    /// True if the wrapped error's cause chain contains a cancellation
    /// sentinel.
    pub fn is_cancelled(&self) -> bool {
        is_cancel(self.source.as_ref())
    }

    /// True if the wrapped error was classified permanent.
    pub fn is_permanent(&self) -> bool {
        self.permanent || is_permanent(self.source.as_ref())
    }

    /// The wrapped operation error.
    pub fn get_ref(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.source.as_ref()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.source, f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}
