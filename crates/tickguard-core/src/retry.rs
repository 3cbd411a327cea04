//! Retry budget and exponential backoff.

use std::time::Duration;

/// Upper bound for a single wait unless a backoff sets its own.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Backoff strategy between attempts of the same call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Uses a fixed delay between retries.
    Fixed {
        /// Delay between retries.
        delay: Duration,
    },
    /// Uses an exponential delay between retries.
    ///
    /// The delay is calculated as `base * (factor ^ retry)`.
    Exponential {
        /// The delay before the first retry.
        base: Duration,
        /// The multiplicative factor for each subsequent retry.
        factor: f64,
        /// Upper bound for a single delay.
        max: Duration,
        /// Whether to apply random jitter (+/- 50%) to the delay.
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::exponential(Duration::from_millis(1_000))
    }
}

impl Backoff {
    /// Doubling backoff from `base`, capped at 30s, without jitter.
    pub const fn exponential(base: Duration) -> Self {
        Self::Exponential {
            base,
            factor: 2.0,
            max: DEFAULT_MAX_DELAY,
            jitter: false,
        }
    }

    /// Longest wait this backoff accepts, server-requested waits included.
    pub fn ceiling(self) -> Duration {
        match self {
            Self::Fixed { delay } => delay.max(DEFAULT_MAX_DELAY),
            Self::Exponential { max, .. } => max,
        }
    }

    /// Delay before retry number `retry` (0-based: 0 is the wait after the first failure).
    pub fn delay(self, retry: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
                let seconds = base.as_secs_f64() * factor.powi(exponent);
                let capped_seconds = seconds.min(max.as_secs_f64());

                let mut delay = Duration::from_secs_f64(capped_seconds);

                if jitter {
                    let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                    let jitter_ms = millis / 2;
                    let random_offset = fastrand::u64(0..=jitter_ms.saturating_mul(2));
                    let total_ms = (millis + random_offset).saturating_sub(jitter_ms);
                    delay = Duration::from_millis(total_ms);
                }

                delay
            }
        }
    }
}

/// Attempt budget for one logical call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Auth replays are not counted.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::default(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::exponential(base_delay),
        }
    }

    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_jitter(mut self, enabled: bool) -> Self {
        if let Backoff::Exponential { jitter, .. } = &mut self.backoff {
            *jitter = enabled;
        }
        self
    }

    /// Whether another attempt is allowed after `attempt` (1-based) failed.
    pub const fn allows_another(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Wait after `attempt` (1-based) failed: `base * 2^(attempt - 1)`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt.saturating_sub(1))
    }

    /// Wait after `attempt` failed when the server asked for `requested`.
    ///
    /// The longer of the two wins, but a requested wait never exceeds
    /// [`Backoff::ceiling`].
    pub fn wait_after(&self, attempt: u32, requested: Option<Duration>) -> Duration {
        let backoff = self.delay_after(attempt);
        match requested {
            Some(requested) => backoff.max(requested.min(self.backoff.ceiling())),
            None => backoff,
        }
    }
}
