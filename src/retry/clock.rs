//! # Clock abstraction for the retry engine.
//!
//! Every read of wall time and every sleep inside
//! [`Backoff::retry`](crate::retry::Backoff::retry) goes through a [`Clock`],
//! so tests can observe or replace time entirely.
//!
//! The default [`TokioClock`] delegates to the tokio runtime clock. Under
//! `#[tokio::test(start_paused = true)]` that clock is virtual:
//! `tokio::time::advance` (or the runtime's auto-advance when all tasks are
//! idle) fires due sleeps synchronously, which makes retry schedules fully
//! deterministic without a hand-rolled fake.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

/// Source of wall time for the retry engine.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current instant on this clock.
    fn now(&self) -> Instant;

    /// Duration from now until `deadline`; zero if it already passed.
    fn until(&self, deadline: Instant) -> Duration {
        deadline.saturating_duration_since(self.now())
    }

    /// Sleeps for `d`. Callers race this against cancellation.
    async fn sleep(&self, d: Duration);
}

/// The tokio runtime clock (virtual under paused test runtimes).
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, d: Duration) {
        tokio::time::sleep(d).await;
    }
}
