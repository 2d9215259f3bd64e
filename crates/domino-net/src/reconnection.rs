//! Exponential backoff for client reconnection.
//!
//! [`ReconnectState`] counts consecutive failed connections. After failure
//! `k` it hands out the wait before reconnection attempt `k`:
//! `base * multiplier^(k-1)`, clamped to `max_delay` and optionally
//! jittered. Failure number `max_attempts` is terminal. A successful open
//! resets the count.

use std::time::Duration;

use rand::Rng;

/// Reconnection policy, built from the `network` config section.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Wait before the first attempt.
    pub initial_delay: Duration,
    /// Growth factor per attempt. Values below 1.0 are treated as 1.0.
    pub backoff_multiplier: f64,
    /// Upper bound for a single wait.
    pub max_delay: Duration,
    /// Consecutive failed connections, the initial drop included, after
    /// which reconnection is given up.
    pub max_attempts: u32,
    /// Spread applied as `delay * (1 ± jitter)`, in `0.0..=1.0`.
    pub jitter: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
            jitter: 0.0,
        }
    }
}

impl ReconnectConfig {
    /// Un-jittered wait before attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let growth = self.backoff_multiplier.max(1.0).powi(exponent);
        let secs = (self.initial_delay.as_secs_f64() * growth).min(self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(secs).unwrap_or(self.max_delay)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if !self.jitter.is_finite() || self.jitter <= 0.0 {
            return delay;
        }
        let spread = self.jitter.min(1.0);
        let factor = rand::rng().random_range((1.0 - spread)..=(1.0 + spread));
        Duration::try_from_secs_f64(delay.as_secs_f64() * factor)
            .unwrap_or(delay)
            .min(self.max_delay)
    }
}

/// Failure counter for one connection.
#[derive(Debug, Clone)]
pub struct ReconnectState {
    config: ReconnectConfig,
    failures: u32,
}

impl ReconnectState {
    /// A fresh counter using `config`.
    pub fn new(config: ReconnectConfig) -> Self {
        Self { config, failures: 0 }
    }

    /// Record one more failed connection and return how long to wait before
    /// the next attempt, or `None` when that failure was the last one
    /// permitted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.failures = self.failures.saturating_add(1);
        if self.is_exhausted() {
            return None;
        }
        Some(self.config.jittered(self.config.delay_for(self.failures)))
    }

    /// Start over, e.g. after a successful open or a deliberate disconnect.
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// Consecutive failures since the last reset.
    pub fn attempts(&self) -> u32 {
        self.failures
    }

    /// Whether the failure budget is used up.
    pub fn is_exhausted(&self) -> bool {
        self.failures >= self.config.max_attempts
    }
}
