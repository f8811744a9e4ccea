//! Runtime configuration for the resilience components.
//!
//! These are the `Duration`-based structs the components consume. The file-backed
//! settings in [`crate::config`] convert into them.

use std::time::Duration;

/// Circuit breaker thresholds for one dependency
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures while closed before the circuit opens
    pub failure_threshold: u32,
    /// Half-open successes required to close the circuit again
    pub success_threshold: u32,
    /// Time spent open before the next request may probe
    pub reset_timeout: Duration,
    /// Upper bound on successful probes admitted while half-open
    pub half_open_max_retries: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: crate::constants::defaults::CIRCUIT_FAILURE_THRESHOLD,
            success_threshold: crate::constants::defaults::CIRCUIT_SUCCESS_THRESHOLD,
            reset_timeout: crate::constants::defaults::CIRCUIT_RESET_TIMEOUT,
            half_open_max_retries: crate::constants::defaults::CIRCUIT_HALF_OPEN_MAX_RETRIES,
        }
    }
}

/// Sliding-window limiter settings
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimiterConfig {
    /// Requests admitted per identity within one window
    pub limit: usize,
    pub window: Duration,
    /// Period of the background pruning pass
    pub cleanup_interval: Duration,
}

impl RateLimiterConfig {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            cleanup_interval: crate::constants::defaults::RATE_LIMITER_CLEANUP_INTERVAL,
        }
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self::new(100, Duration::from_secs(60))
    }
}
