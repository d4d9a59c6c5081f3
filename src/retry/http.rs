//! # HTTP error classification for the retry engine.
//!
//! Thin predicates plugging `reqwest` failures into the transformer chain:
//!
//! - [`transformer`] marks transport errors permanent unless they are
//!   transient (timeouts and connection failures);
//! - [`check_status`] inspects a response that arrived successfully and
//!   promotes an error status into an error — 429 and 5xx stay retriable,
//!   any other error status is marked permanent.
//!
//! ```no_run
//! use opskit::retry::{http, Backoff};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let backoff = Backoff::builder().transformer(http::transformer()).build()?;
//! let client = reqwest::Client::new();
//!
//! let resp = backoff
//!     .retry(&opskit::Context::new(), |_ctx, _record| {
//!         let client = client.clone();
//!         async move {
//!             let resp = client.get("https://example.com/health").send().await?;
//!             http::check_status(resp)
//!         }
//!     })
//!     .await?;
//! # let _ = resp;
//! # Ok(())
//! # }
//! ```

use reqwest::StatusCode;
use thiserror::Error;

use super::{permanent, ErrTransformer};
use crate::BoxError;

/// A response arrived but carried an error status.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("unexpected status: {0}")]
pub struct StatusError(pub StatusCode);

/// Returns a transformer that stops retries for `reqwest` errors that are
/// not transient. Errors of other types pass through untouched.
pub fn transformer() -> impl ErrTransformer {
    |err: BoxError| {
        let keep = match err.downcast_ref::<reqwest::Error>() {
            Some(e) => is_transient(e),
            None => true,
        };
        if keep {
            err
        } else {
            permanent(err)
        }
    }
}

/// True if retrying the request could plausibly succeed.
fn is_transient(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

/// Promotes an error status on an otherwise successful response into an
/// error: 429 and 5xx stay retriable, other error statuses are permanent.
/// Non-error statuses pass the response through.
pub fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, BoxError> {
    match status_failure(resp.status()) {
        None => Ok(resp),
        Some(err) => Err(err),
    }
}

fn status_failure(status: StatusCode) -> Option<BoxError> {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return Some(Box::new(StatusError(status)));
    }
    if status.is_client_error() {
        return Some(permanent(StatusError(status)));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::is_permanent;

    #[test]
    fn retriable_statuses_stay_unmarked() {
        for status in [StatusCode::TOO_MANY_REQUESTS, StatusCode::SERVICE_UNAVAILABLE] {
            let err = status_failure(status).expect("is a failure");
            assert!(!is_permanent(err.as_ref()), "{status}");
        }
    }

    #[test]
    fn other_client_errors_are_permanent() {
        for status in [StatusCode::BAD_REQUEST, StatusCode::NOT_FOUND] {
            let err = status_failure(status).expect("is a failure");
            assert!(is_permanent(err.as_ref()), "{status}");
        }
    }

    #[test]
    fn healthy_statuses_pass() {
        assert!(status_failure(StatusCode::OK).is_none());
        assert!(status_failure(StatusCode::TEMPORARY_REDIRECT).is_none());
    }

    #[test]
    fn transformer_ignores_foreign_errors() {
        let t = transformer();
        let err = t.transform(Box::new(StatusError(StatusCode::IM_A_TEAPOT)));
        assert!(!is_permanent(err.as_ref()));
    }
}
