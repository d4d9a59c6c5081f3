//! # Backoff policy.
//!
//! [`Policy`] controls how retry delays grow after repeated failures:
//! - [`Policy::initial_interval`] the first nonzero wait;
//! - [`Policy::multiplier`] the per-attempt growth factor;
//! - [`Policy::randomization_factor`] the jitter width;
//! - [`Policy::max_interval`] the cap for the unrandomized interval.
//!
//! A policy is plain serde-expressible data. Validation happens once, when a
//! [`Backoff`](crate::retry::Backoff) is built; a constructed engine always
//! holds a valid policy.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use opskit::Policy;
//!
//! let policy = Policy {
//!     initial_interval: Duration::from_millis(50),
//!     ..Policy::default()
//! };
//! assert!(policy.validate().is_ok());
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation failures for [`Policy`] and engine construction.
#[non_exhaustive]
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PolicyError {
    /// `initial_interval` was zero.
    #[error("initial_interval must be greater than zero")]
    InitialInterval,

    /// `multiplier` was not strictly greater than 1 (or not a number).
    #[error("multiplier must be greater than 1")]
    Multiplier,

    /// `randomization_factor` was outside `[0, 1]` (or not a number).
    #[error("randomization_factor must be between 0 and 1")]
    RandomizationFactor,

    /// `max_interval` was zero.
    #[error("max_interval must be greater than zero")]
    MaxInterval,

    /// `initial_interval` exceeded `max_interval`.
    #[error("initial_interval must not exceed max_interval")]
    IntervalOrder,

    /// The bounded-attempt budget was zero.
    #[error("max_attempts must be greater than zero")]
    MaxAttempts,
}

/// Exponential backoff configuration.
///
/// The unrandomized wait before attempt `n + 1` is
/// `initial_interval * multiplier^(n-1)`, capped at `max_interval`. Each wait
/// is then jittered into
/// `[interval * (1 - randomization_factor), interval * (1 + randomization_factor)]`
/// to spread retries from independent callers apart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    /// First nonzero wait. Must be greater than zero.
    pub initial_interval: Duration,

    /// Per-attempt growth factor. Must be strictly greater than 1.
    pub multiplier: f64,

    /// Jitter width in `[0, 1]`. `0` disables jitter; `0.5` spreads each
    /// wait over `[0.5x, 1.5x]`.
    pub randomization_factor: f64,

    /// Ceiling for the unrandomized interval. Must be at least
    /// `initial_interval`. Jitter may still exceed it by up to
    /// `randomization_factor`.
    pub max_interval: Duration,
}

impl Default for Policy {
    /// Returns the stock policy: 100ms initial interval, 2.0 multiplier,
    /// 0.5 randomization factor, 60s max interval.
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(100),
            multiplier: 2.0,
            randomization_factor: 0.5,
            max_interval: Duration::from_secs(60),
        }
    }
}

impl Policy {
    /// Checks every constraint, returning the first violation.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.initial_interval.is_zero() {
            return Err(PolicyError::InitialInterval);
        }
        // `!(x > 1.0)` instead of `x <= 1.0` so NaN is rejected too.
        if !(self.multiplier > 1.0) {
            return Err(PolicyError::Multiplier);
        }
        if !(self.randomization_factor >= 0.0 && self.randomization_factor <= 1.0) {
            return Err(PolicyError::RandomizationFactor);
        }
        if self.max_interval.is_zero() {
            return Err(PolicyError::MaxInterval);
        }
        if self.initial_interval > self.max_interval {
            return Err(PolicyError::IntervalOrder);
        }
        Ok(())
    }

    /// Grows `interval` by one step, capping at `max_interval`.
    pub(crate) fn grow(&self, interval: Duration) -> Duration {
        let grown = interval.as_secs_f64() * self.multiplier;
        if !grown.is_finite() || grown >= self.max_interval.as_secs_f64() {
            self.max_interval
        } else {
            interval.mul_f64(self.multiplier).min(self.max_interval)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Policy {
        Policy::default()
    }

    #[test]
    fn default_policy_is_valid() {
        assert_eq!(base().validate(), Ok(()));
    }

    #[test]
    fn rejects_zero_initial_interval() {
        let p = Policy {
            initial_interval: Duration::ZERO,
            ..base()
        };
        assert_eq!(p.validate(), Err(PolicyError::InitialInterval));
    }

    #[test]
    fn rejects_multiplier_not_above_one() {
        let p = Policy {
            multiplier: 1.0,
            ..base()
        };
        assert_eq!(p.validate(), Err(PolicyError::Multiplier));

        let p = Policy {
            multiplier: f64::NAN,
            ..base()
        };
        assert_eq!(p.validate(), Err(PolicyError::Multiplier));
    }

    #[test]
    fn rejects_randomization_factor_out_of_range() {
        let p = Policy {
            randomization_factor: 1.1,
            ..base()
        };
        assert_eq!(p.validate(), Err(PolicyError::RandomizationFactor));

        let p = Policy {
            randomization_factor: -0.1,
            ..base()
        };
        assert_eq!(p.validate(), Err(PolicyError::RandomizationFactor));
    }

    #[test]
    fn rejects_zero_max_interval() {
        let p = Policy {
            max_interval: Duration::ZERO,
            ..base()
        };
        assert_eq!(p.validate(), Err(PolicyError::MaxInterval));
    }

    #[test]
    fn rejects_initial_above_max() {
        let p = Policy {
            initial_interval: Duration::from_secs(120),
            max_interval: Duration::from_secs(60),
            ..base()
        };
        assert_eq!(p.validate(), Err(PolicyError::IntervalOrder));
    }

    #[test]
    fn grow_caps_at_max_interval() {
        let p = base();
        assert_eq!(
            p.grow(Duration::from_millis(100)),
            Duration::from_millis(200)
        );
        assert_eq!(p.grow(Duration::from_secs(40)), Duration::from_secs(60));
        assert_eq!(p.grow(Duration::from_secs(60)), Duration::from_secs(60));
    }

    #[test]
    fn serde_round_trip_with_partial_fields() {
        let json = r#"{"multiplier": 3.0}"#;
        let p: Policy = serde_json::from_str(json).unwrap();
        assert_eq!(p.multiplier, 3.0);
        assert_eq!(p.initial_interval, Duration::from_millis(100));

        let encoded = serde_json::to_string(&p).unwrap();
        let back: Policy = serde_json::from_str(&encoded).unwrap();
        assert_eq!(back, p);
    }
}
