//! # TimeTable: a policy projected onto a bounded attempt count.
//!
//! [`TimeTable`] answers "how long could these retries take?" without running
//! them: for each attempt it lists the unrandomized interval and the jitter
//! bounds, plus cumulative best/worst-case totals. It is a pure computation
//! over a [`Policy`] — the clock is never touched — which makes it suitable
//! both for the engine's own bookkeeping and for external tools that render
//! retry schedules for humans.

use std::time::Duration;

use serde::Serialize;

use super::policy::Policy;

/// One attempt's row in a [`TimeTable`].
///
/// The first entry is always all-zero: nothing is waited before the first
/// attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Entry {
    /// 1-based attempt number.
    pub attempt: u32,
    /// Unrandomized wait before this attempt.
    pub interval: Duration,
    /// Shortest jittered wait: `interval * (1 - randomization_factor)`.
    pub min_interval: Duration,
    /// Longest jittered wait: `interval * (1 + randomization_factor)`.
    pub max_interval: Duration,
}

impl Entry {
    fn zero(attempt: u32) -> Self {
        Self {
            attempt,
            interval: Duration::ZERO,
            min_interval: Duration::ZERO,
            max_interval: Duration::ZERO,
        }
    }

    fn jittered(attempt: u32, interval: Duration, randomization_factor: f64) -> Self {
        Self {
            attempt,
            interval,
            min_interval: interval.mul_f64((1.0 - randomization_factor).max(0.0)),
            max_interval: interval.mul_f64(1.0 + randomization_factor),
        }
    }
}

/// Projection of a [`Policy`] onto a bounded attempt count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeTable {
    /// Sum of every entry's `min_interval`: the best-case total wait.
    pub min_time: Duration,
    /// Sum of every entry's `max_interval`: the worst-case total wait.
    pub max_time: Duration,
    /// Per-attempt rows, ordered by attempt.
    pub entries: Vec<Entry>,
}

impl Policy {
    /// Projects this policy onto `attempts` attempts.
    ///
    /// - `attempts >= 1` yields exactly that many entries;
    /// - `attempts == 0` yields the single all-zero entry (the free first
    ///   try);
    /// - `attempts == -1` extends the table until the interval reaches
    ///   `max_interval`, including the first clamped entry — the plateau all
    ///   later attempts would repeat.
    pub fn timetable(&self, attempts: i32) -> TimeTable {
        let total = match attempts {
            a if a < 0 => usize::MAX,
            0 => 1,
            a => a as usize,
        };
        let until_plateau = attempts < 0;

        let mut entries = vec![Entry::zero(1)];
        let mut interval = self.initial_interval;
        let mut attempt = 2u32;

        while entries.len() < total {
            entries.push(Entry::jittered(attempt, interval, self.randomization_factor));
            if until_plateau && interval >= self.max_interval {
                break;
            }
            interval = self.grow(interval);
            attempt += 1;
        }

        let mut min_time = Duration::ZERO;
        let mut max_time = Duration::ZERO;
        for e in &entries {
            min_time += e.min_interval;
            max_time += e.max_interval;
        }

        TimeTable {
            min_time,
            max_time,
            entries,
        }
    }
}
