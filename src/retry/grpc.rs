//! # gRPC status classification for the retry engine.
//!
//! [`Transformer`] inspects `tonic::Status` failures and marks them
//! permanent unless their code is worth retrying. The stock retriable set is
//! `Cancelled`, `DeadlineExceeded`, `Unknown`, `Internal`, `Unavailable` and
//! `ResourceExhausted`; anything else stops the loop. Extra codes can be
//! allowed per call site.
//!
//! [`ResponseCheck`] covers the other failure surface: calls that succeed at
//! the transport layer but encode an application-level failure in the
//! response body. Caller-supplied inspectors look at the decoded message and
//! may synthesize an error, marked permanent or not.
//!
//! ```no_run
//! use opskit::retry::{grpc, Backoff};
//! use tonic::Code;
//!
//! # fn demo() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let backoff = Backoff::builder()
//!     .transformer(grpc::Transformer::new().extra_codes([Code::DataLoss]))
//!     .build()?;
//! # let _ = backoff;
//! # Ok(())
//! # }
//! ```

use tonic::{Code, Status};

use super::{is_permanent, permanent, ErrTransformer};
use crate::BoxError;

/// Codes retried unless the caller opts out.
const RETRIABLE: [Code; 6] = [
    Code::Cancelled,
    Code::DeadlineExceeded,
    Code::Unknown,
    Code::Internal,
    Code::Unavailable,
    Code::ResourceExhausted,
];

/// Marks non-retriable `tonic::Status` errors permanent.
///
/// Errors of other types pass through untouched, as do statuses whose code
/// is in the retriable set.
#[derive(Debug, Clone, Default)]
pub struct Transformer {
    extras: Vec<Code>,
}

impl Transformer {
    /// A transformer with the stock retriable set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Additionally treats `codes` as retriable.
    #[must_use]
    pub fn extra_codes(mut self, codes: impl IntoIterator<Item = Code>) -> Self {
        self.extras.extend(codes);
        self
    }

    fn is_retriable(&self, code: Code) -> bool {
        RETRIABLE.contains(&code) || self.extras.contains(&code)
    }
}

impl ErrTransformer for Transformer {
    fn transform(&self, err: BoxError) -> BoxError {
        let code = match err.downcast_ref::<Status>() {
            Some(status) => status.code(),
            None => return err,
        };
        // A status of Ok inside an error is a caller bug; leave it alone.
        if code == Code::Ok || self.is_retriable(code) {
            return err;
        }
        permanent(err)
    }
}

/// Inspects decoded responses for application-level failures.
///
/// Inspectors run in order on a successful response. A `None` verdict lets
/// the chain continue; a permanent error short-circuits it immediately; a
/// retriable error is carried along but later inspectors still run and may
/// escalate.
pub struct ResponseCheck<T> {
    inspectors: Vec<Box<dyn Fn(&T) -> Option<BoxError> + Send + Sync>>,
}

impl<T> Default for ResponseCheck<T> {
    fn default() -> Self {
        Self {
            inspectors: Vec::new(),
        }
    }
}

impl<T> ResponseCheck<T> {
    /// A check with no inspectors; [`ResponseCheck::check`] then only maps
    /// transport failures.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an inspector.
    #[must_use]
    pub fn inspector(
        mut self,
        f: impl Fn(&T) -> Option<BoxError> + Send + Sync + 'static,
    ) -> Self {
        self.inspectors.push(Box::new(f));
        self
    }

    /// Applies the inspectors to a call result.
    ///
    /// Transport failures pass through unchanged (the transformer chain
    /// classifies them). Successful responses are handed to each inspector
    /// in order.
    pub fn check(&self, result: Result<T, Status>) -> Result<T, BoxError> {
        let resp = match result {
            Ok(resp) => resp,
            Err(status) => return Err(Box::new(status)),
        };

        let mut found: Option<BoxError> = None;
        for inspect in &self.inspectors {
            if let Some(err) = inspect(&resp) {
                if is_permanent(err.as_ref()) {
                    return Err(err);
                }
                found = Some(err);
            }
        }
        match found {
            Some(err) => Err(err),
            None => Ok(resp),
        }
    }
}
