//! # Exponential backoff retries.
//!
//! [`Backoff`] drives an async operation until it succeeds, fails
//! permanently, runs out of attempts, or the caller's [`Context`] fires.
//!
//! ## Attempt flow
//! ```text
//! loop {
//!   ├─► op(ctx, record)            (attempt n, runs on the caller's task)
//!   ├─► Ok  → return value
//!   ├─► Err → transformer chain    (classification, may mark permanent)
//!   ├─► permanent?                 → stop with the error
//!   ├─► attempt budget exhausted?  → stop with the error
//!   ├─► jitter the next interval
//!   ├─► deadline too close / ctx cancelled? → stop, cancelled
//!   └─► sleep (cancellable) ─► grow interval ─► next attempt
//! }
//! ```
//!
//! The engine spawns no helper tasks and owns no shared state; concurrent
//! [`Backoff::retry`] calls are independent. Every read of wall time goes
//! through the injected [`Clock`].
//!
//! ## Example
//! ```no_run
//! use std::time::Duration;
//! use opskit::retry::{permanent, Backoff};
//! use opskit::Context;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let backoff = Backoff::builder()
//!     .transformer(|err: opskit::BoxError| {
//!         // Anything that isn't a timeout is not worth retrying here.
//!         if err.to_string().contains("timed out") {
//!             err
//!         } else {
//!             permanent(err)
//!         }
//!     })
//!     .build()?;
//!
//! let ctx = Context::with_timeout(Duration::from_secs(30));
//! backoff
//!     .retry(&ctx, |_ctx, _record| async { poll_job().await })
//!     .await?;
//! # Ok(())
//! # }
//! # async fn poll_job() -> Result<(), opskit::BoxError> { Ok(()) }
//! ```

mod clock;
mod error;
mod policy;
mod timetable;

#[cfg(feature = "grpc")]
pub mod grpc;
#[cfg(feature = "http")]
pub mod http;

pub use clock::{Clock, TokioClock};
pub use error::{is_permanent, permanent, ErrTransformer, Error, Permanent, SharedError};
pub use policy::{Policy, PolicyError};
pub use timetable::{Entry, TimeTable};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::context::Context;
use crate::BoxError;

/// Per-attempt observation handed to the operation callback.
///
/// The record the operation sees describes the attempt about to run, not the
/// engine's internals: how many attempts so far, how long the engine just
/// waited, how long it has waited in total, and what the previous attempt
/// returned.
#[derive(Debug, Clone, Default)]
pub struct Record {
    /// 1-based attempt counter.
    pub attempt: u32,

    /// The randomized wait taken just before this attempt; zero on the
    /// first.
    pub last_interval: Duration,

    /// Cumulative sleep time across all prior waits. Time spent inside the
    /// operation itself is not counted.
    pub total_interval: Duration,

    /// The (transformed) error returned by the previous attempt; `None` on
    /// the first.
    pub err: Option<SharedError>,
}

/// Exponential backoff retry engine.
///
/// Built once, used for any number of [`Backoff::retry`] calls. Construction
/// validates the [`Policy`]; an engine in hand always holds a valid one.
pub struct Backoff {
    policy: Policy,
    transformers: Vec<Arc<dyn ErrTransformer>>,
    max_attempts: Option<u32>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Backoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backoff")
            .field("policy", &self.policy)
            .field("transformers", &self.transformers.len())
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

impl Backoff {
    /// An engine with the stock [`Policy`], no transformers, no attempt
    /// budget, and the tokio clock.
    pub fn new() -> Self {
        Self {
            policy: Policy::default(),
            transformers: Vec::new(),
            max_attempts: None,
            clock: Arc::new(TokioClock),
        }
    }

    /// Starts building a customized engine.
    pub fn builder() -> BackoffBuilder {
        BackoffBuilder::default()
    }

    /// The engine's policy.
    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Projects the engine's policy onto `attempts` attempts; see
    /// [`Policy::timetable`].
    pub fn timetable(&self, attempts: i32) -> TimeTable {
        self.policy.timetable(attempts)
    }

    /// Runs `op` until it succeeds or the engine decides to stop.
    ///
    /// The operation receives a child view of the context and the [`Record`]
    /// of the attempt about to run. It is invoked on the caller's task; a
    /// cancellation arriving while the operation runs is observed only once
    /// it returns.
    ///
    /// Stop conditions, in classification order:
    /// - the (transformed) error carries the permanent marker
    ///   ([`Error::is_permanent`]);
    /// - the attempt budget is exhausted (both flags false);
    /// - the context fired, its deadline leaves no room for the next wait,
    ///   or it cancelled mid-sleep ([`Error::cancelled`]).
    pub async fn retry<T, F, Fut>(&self, ctx: &Context, mut op: F) -> Result<T, Error>
    where
        F: FnMut(Context, Record) -> Fut,
        Fut: Future<Output = Result<T, BoxError>>,
    {
        let mut record = Record {
            attempt: 1,
            ..Record::default()
        };
        let mut interval = self.policy.initial_interval;

        loop {
            let raw = match op(ctx.clone(), record.clone()).await {
                Ok(v) => return Ok(v),
                Err(err) => err,
            };

            let mut err = raw;
            for t in &self.transformers {
                err = t.transform(err);
            }

            if is_permanent(err.as_ref()) {
                tracing::debug!(attempt = record.attempt, error = %err, "permanent error, giving up");
                return Err(Error::permanent_stop(err, record));
            }

            if let Some(max) = self.max_attempts {
                if record.attempt >= max {
                    tracing::warn!(attempts = record.attempt, error = %err, "attempt budget exhausted");
                    return Err(Error::exhausted_stop(err, record));
                }
            }

            let next = self.randomize(interval);
            if !self.ctx_ok(ctx, next) {
                return Err(Error::cancelled_stop(SharedError::from(err), record));
            }

            tracing::debug!(
                attempt = record.attempt,
                delay_ms = next.as_millis() as u64,
                error = %err,
                "retrying after backoff"
            );
            tokio::select! {
                _ = self.clock.sleep(next) => {}
                _ = ctx.cancelled() => {
                    return Err(Error::cancelled_stop(SharedError::from(err), record));
                }
            }

            record.total_interval += next;
            record.attempt += 1;
            record.last_interval = next;
            record.err = Some(SharedError::from(err));
            interval = self.policy.grow(interval);
        }
    }

    /// Jitters `interval` into
    /// `[interval * (1 - rf), interval * (1 + rf))`.
    fn randomize(&self, interval: Duration) -> Duration {
        let rf = self.policy.randomization_factor;
        if rf == 0.0 {
            return interval;
        }
        let r: f64 = rand::rng().random();
        interval.mul_f64((1.0 - rf + 2.0 * rf * r).max(0.0))
    }

    /// True if the context is still live and its deadline (if any) leaves
    /// room for a wait of `interval`.
    fn ctx_ok(&self, ctx: &Context, interval: Duration) -> bool {
        if ctx.is_cancelled() {
            return false;
        }
        if let Some(deadline) = ctx.deadline() {
            match deadline.checked_duration_since(self.clock.now()) {
                Some(remaining) => {
                    if remaining < interval {
                        return false;
                    }
                }
                None => return false,
            }
        }
        true
    }
}

/// Builder for [`Backoff`]; see [`Backoff::builder`].
pub struct BackoffBuilder {
    policy: Policy,
    transformers: Vec<Arc<dyn ErrTransformer>>,
    max_attempts: Option<u32>,
    clock: Arc<dyn Clock>,
}

impl Default for BackoffBuilder {
    fn default() -> Self {
        Self {
            policy: Policy::default(),
            transformers: Vec::new(),
            max_attempts: None,
            clock: Arc::new(TokioClock),
        }
    }
}

impl BackoffBuilder {
    /// Replaces the stock policy.
    #[must_use]
    pub fn policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    /// Appends a transformer to the classification chain. Transformers run
    /// in the order they were added.
    #[must_use]
    pub fn transformer(mut self, t: impl ErrTransformer + 'static) -> Self {
        self.transformers.push(Arc::new(t));
        self
    }

    /// Caps the total number of attempts (the free first try included).
    /// Must be at least 1.
    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Replaces the wall-time source. Tests use this to observe or control
    /// the engine's sleeps.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Validates the configuration and builds the engine.
    pub fn build(self) -> Result<Backoff, PolicyError> {
        self.policy.validate()?;
        if self.max_attempts == Some(0) {
            return Err(PolicyError::MaxAttempts);
        }
        Ok(Backoff {
            policy: self.policy,
            transformers: self.transformers,
            max_attempts: self.max_attempts,
            clock: self.clock,
        })
    }
}
