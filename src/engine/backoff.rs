//! Retry delay after a failed workflow attempt.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How long a failed workflow waits before it is queued again.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Same delay after every failure.
    Fixed {
        #[serde(with = "secs")]
        delay: Duration,
    },
    /// `base * multiplier^(n-1)` for the n-th consecutive failure, capped at
    /// `max`.
    Exponential {
        #[serde(with = "secs")]
        base: Duration,
        #[serde(with = "secs")]
        max: Duration,
        multiplier: f64,
    },
}

impl RetryPolicy {
    /// Delay before retrying after `consecutive_failures` failures in a row.
    pub fn delay(&self, consecutive_failures: u32) -> Duration {
        match *self {
            RetryPolicy::Fixed { delay } => delay,
            RetryPolicy::Exponential {
                base,
                max,
                multiplier,
            } => {
                let exp = consecutive_failures.saturating_sub(1).min(i32::MAX as u32) as i32;
                let factor = multiplier.max(1.0).powi(exp);
                let secs = base.as_secs_f64() * factor;
                if !secs.is_finite() || secs >= max.as_secs_f64() {
                    max
                } else {
                    Duration::from_secs_f64(secs)
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::Exponential {
            base: Duration::from_secs(15 * 60),
            max: Duration::from_secs(4 * 60 * 60),
            multiplier: 2.0,
        }
    }
}

/// Serde helpers for Duration (serialized as seconds: u64)
mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
