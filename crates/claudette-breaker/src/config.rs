//! Circuit breaker configuration.

use std::time::Duration;

/// Hard cap on the progressive reset timer.
pub const MAX_RESET: Duration = Duration::from_secs(30 * 60);

/// Configuration for one circuit breaker.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    pub(crate) failure_threshold: u32,
    pub(crate) window_size: usize,
    pub(crate) failure_rate_threshold: f64,
    pub(crate) slow_call_threshold: Duration,
    pub(crate) slow_call_rate_threshold: f64,
    pub(crate) base_reset: Duration,
    pub(crate) half_open_max_calls: usize,
}

impl BreakerConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> BreakerConfigBuilder {
        BreakerConfigBuilder::new()
    }

    /// The progressive reset duration for a given consecutive-failure count:
    /// `base_reset × 1.5^(failures − threshold)`, capped at 30 minutes.
    pub fn reset_duration(&self, consecutive_failures: u32) -> Duration {
        let over = consecutive_failures.saturating_sub(self.failure_threshold);
        let factor = 1.5_f64.powi(over.min(64) as i32);
        let reset = self.base_reset.mul_f64(factor);
        reset.min(MAX_RESET)
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        BreakerConfigBuilder::new().build()
    }
}

/// Builder for configuring a circuit breaker.
#[derive(Debug, Clone)]
pub struct BreakerConfigBuilder {
    failure_threshold: u32,
    window_size: usize,
    failure_rate_threshold: f64,
    slow_call_threshold: Duration,
    slow_call_rate_threshold: f64,
    base_reset: Duration,
    half_open_max_calls: usize,
}

impl BreakerConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            failure_threshold: 5,
            window_size: 20,
            failure_rate_threshold: 0.5,
            slow_call_threshold: Duration::from_millis(15_000),
            slow_call_rate_threshold: 0.8,
            base_reset: Duration::from_millis(30_000),
            half_open_max_calls: 3,
        }
    }

    /// Consecutive failures that open the circuit regardless of rates.
    ///
    /// Default: 5
    pub fn failure_threshold(mut self, n: u32) -> Self {
        self.failure_threshold = n;
        self
    }

    /// Number of recent call outcomes kept in the sliding window.
    ///
    /// Default: 20
    pub fn window_size(mut self, size: usize) -> Self {
        self.window_size = size;
        self
    }

    /// Failure rate at which the circuit opens, once the window holds at
    /// least half its capacity.
    ///
    /// Default: 0.5 (50%)
    pub fn failure_rate_threshold(mut self, rate: f64) -> Self {
        self.failure_rate_threshold = rate;
        self
    }

    /// Duration at or above which a call counts as slow.
    ///
    /// Default: 15 seconds
    pub fn slow_call_threshold(mut self, threshold: Duration) -> Self {
        self.slow_call_threshold = threshold;
        self
    }

    /// Slow-call rate at which the circuit opens.
    ///
    /// Default: 0.8 (80%)
    pub fn slow_call_rate_threshold(mut self, rate: f64) -> Self {
        self.slow_call_rate_threshold = rate;
        self
    }

    /// Base cooldown while open; grows by 1.5× per failure beyond the
    /// threshold, capped at 30 minutes.
    ///
    /// Default: 30 seconds
    pub fn base_reset(mut self, duration: Duration) -> Self {
        self.base_reset = duration;
        self
    }

    /// Maximum concurrent probe calls while half-open.
    ///
    /// Default: 3
    pub fn half_open_max_calls(mut self, n: usize) -> Self {
        self.half_open_max_calls = n;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.failure_threshold.max(1),
            window_size: self.window_size.max(1),
            failure_rate_threshold: self.failure_rate_threshold.clamp(0.0, 1.0),
            slow_call_threshold: self.slow_call_threshold,
            slow_call_rate_threshold: self.slow_call_rate_threshold.clamp(0.0, 1.0),
            base_reset: self.base_reset,
            half_open_max_calls: self.half_open_max_calls.max(1),
        }
    }
}

impl Default for BreakerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
