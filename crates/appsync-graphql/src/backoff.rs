//! Exponential backoff shared by the HTTP retry loop and the socket dialer.

use std::time::Duration;

/// Configuration for exponential backoff between attempts.
#[derive(Clone, Debug, PartialEq)]
pub struct BackoffConfig {
    /// Maximum number of attempts. `None` means retry until stopped externally.
    pub max_attempts: Option<u32>,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound for a single delay (before jitter).
    pub max_delay: Duration,
    /// Multiplier applied per attempt.
    pub multiplier: f64,
    /// Relative jitter applied to each delay, in `[0, 1]`.
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            multiplier: 1.5,
            jitter: 0.5,
        }
    }
}

impl BackoffConfig {
    /// Create a new backoff configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of attempts.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Set the initial delay.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the multiplier.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Set the relative jitter. Values are clamped to `[0, 1]`.
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Whether another attempt is allowed after `attempt` failures (0-indexed).
    pub fn allows_retry(&self, attempt: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempt + 1 < max)
    }

    /// Calculate the delay after the given failed attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_delay.as_millis() as f64;
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay_ms = (base_ms * self.multiplier.powi(exponent))
            .min(self.max_delay.as_millis() as f64);

        // Spread uniformly over delay * (1 ± jitter)
        let spread = self.jitter * (2.0 * rand::random::<f64>() - 1.0);
        Duration::from_millis((delay_ms * (1.0 + spread)).max(0.0) as u64)
    }
}
