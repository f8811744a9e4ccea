//! # Resilience Configuration
//!
//! File- and environment-backed settings for every resilience component.
//!
//! ## Architecture
//!
//! - **Layered sources**: built-in defaults, then an optional TOML/YAML/JSON file, then
//!   `RESILIENCE_*` environment variables
//! - **Environment presets**: `test` and `development` start from faster, smaller
//!   defaults than production
//! - **Explicit validation**: settings that would wedge a component are rejected at load
//!
//! Durations are stored as integer `*_ms` fields so they read naturally in files and
//! environment variables; each section converts into the `Duration`-based runtime
//! config its component consumes.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use resilience_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load configuration (environment auto-detected)
//! let manager = ConfigManager::load()?;
//!
//! let pool = manager.config().worker_pool.to_worker_pool_config();
//! let retry = manager.config().retry.to_retry_config();
//! # let _ = (pool, retry);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::cache::CacheConfig;
use crate::constants::{defaults, limiters};
use crate::error::ErrorKind;
use crate::execution::WorkerPoolConfig;
use crate::resilience::{CircuitBreakerConfig, RateLimiterConfig, RetryConfig};
use crate::spans::TracerConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ResilienceConfig {
    pub rate_limits: RateLimitsConfig,
    pub circuit_breakers: CircuitBreakersConfig,
    pub cache: CacheSettings,
    pub worker_pool: WorkerPoolSettings,
    pub retry: RetrySettings,
    pub tracer: TracerSettings,
}

/// Named sliding-window limiters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitsConfig {
    pub cleanup_interval_ms: u64,
    pub limiters: HashMap<String, RateLimitSettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitSettings {
    pub limit: usize,
    pub window_ms: u64,
}

impl RateLimitSettings {
    pub fn window_duration(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        let per_minute = |limit| RateLimitSettings {
            limit,
            window_ms: 60_000,
        };
        Self {
            cleanup_interval_ms: defaults::RATE_LIMITER_CLEANUP_INTERVAL.as_millis() as u64,
            limiters: HashMap::from([
                (limiters::API.to_string(), per_minute(100)),
                (limiters::SDK.to_string(), per_minute(10)),
                (limiters::PUBLIC_API.to_string(), per_minute(50)),
            ]),
        }
    }
}

impl RateLimitsConfig {
    pub fn cleanup_interval_duration(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }

    /// Runtime configs for every configured limiter, sorted by name
    pub fn to_rate_limiter_configs(&self) -> Vec<(String, RateLimiterConfig)> {
        let mut configs: Vec<_> = self
            .limiters
            .iter()
            .map(|(name, settings)| {
                let config = RateLimiterConfig::new(settings.limit, settings.window_duration())
                    .with_cleanup_interval(self.cleanup_interval_duration());
                (name.clone(), config)
            })
            .collect();
        configs.sort_by(|a, b| a.0.cmp(&b.0));
        configs
    }
}

/// Breaker thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub reset_timeout_ms: u64,
    pub half_open_max_retries: u32,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: defaults::CIRCUIT_FAILURE_THRESHOLD,
            success_threshold: defaults::CIRCUIT_SUCCESS_THRESHOLD,
            reset_timeout_ms: defaults::CIRCUIT_RESET_TIMEOUT.as_millis() as u64,
            half_open_max_retries: defaults::CIRCUIT_HALF_OPEN_MAX_RETRIES,
        }
    }
}

impl CircuitBreakerSettings {
    pub fn reset_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    pub fn to_circuit_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            success_threshold: self.success_threshold,
            reset_timeout: self.reset_timeout_duration(),
            half_open_max_retries: self.half_open_max_retries,
        }
    }
}

/// Default breaker settings plus per-dependency overrides
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CircuitBreakersConfig {
    pub default: CircuitBreakerSettings,
    pub components: HashMap<String, CircuitBreakerSettings>,
}

impl CircuitBreakersConfig {
    pub fn config_for(&self, component: &str) -> CircuitBreakerConfig {
        self.components
            .get(component)
            .unwrap_or(&self.default)
            .to_circuit_breaker_config()
    }

    pub fn component_configs(&self) -> HashMap<String, CircuitBreakerConfig> {
        self.components
            .iter()
            .map(|(name, settings)| (name.clone(), settings.to_circuit_breaker_config()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub sweep_interval_ms: u64,
    pub default_ttl_ms: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            sweep_interval_ms: defaults::CACHE_SWEEP_INTERVAL.as_millis() as u64,
            default_ttl_ms: defaults::CACHE_DEFAULT_TTL.as_millis() as u64,
        }
    }
}

impl CacheSettings {
    pub fn to_cache_config(&self) -> CacheConfig {
        CacheConfig {
            sweep_interval: Duration::from_millis(self.sweep_interval_ms),
            default_ttl: Duration::from_millis(self.default_ttl_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerPoolSettings {
    pub worker_count: usize,
    pub queue_capacity: usize,
}

impl Default for WorkerPoolSettings {
    fn default() -> Self {
        Self {
            worker_count: defaults::WORKER_COUNT,
            queue_capacity: defaults::WORKER_QUEUE_CAPACITY,
        }
    }
}

impl WorkerPoolSettings {
    pub fn to_worker_pool_config(&self) -> WorkerPoolConfig {
        WorkerPoolConfig {
            worker_count: self.worker_count,
            queue_capacity: self.queue_capacity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
    pub multiplier: f64,
    pub random_factor: f64,
    /// Empty retries every error
    pub retryable_errors: Vec<ErrorKind>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: defaults::RETRY_MAX_RETRIES,
            initial_interval_ms: defaults::RETRY_INITIAL_INTERVAL.as_millis() as u64,
            max_interval_ms: defaults::RETRY_MAX_INTERVAL.as_millis() as u64,
            multiplier: defaults::RETRY_MULTIPLIER,
            random_factor: defaults::RETRY_RANDOM_FACTOR,
            retryable_errors: Vec::new(),
        }
    }
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            initial_interval: Duration::from_millis(self.initial_interval_ms),
            max_interval: Duration::from_millis(self.max_interval_ms),
            multiplier: self.multiplier,
            random_factor: self.random_factor,
            retryable_errors: self.retryable_errors.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracerSettings {
    pub max_spans: usize,
}

impl Default for TracerSettings {
    fn default() -> Self {
        Self {
            max_spans: defaults::TRACER_MAX_SPANS,
        }
    }
}

impl TracerSettings {
    pub fn to_tracer_config(&self) -> TracerConfig {
        TracerConfig {
            max_spans: self.max_spans,
        }
    }
}

impl ResilienceConfig {
    /// Fast timings and small pools for test suites
    pub fn for_test() -> Self {
        let mut config = Self::default();
        config.rate_limits.cleanup_interval_ms = 1_000;
        config.circuit_breakers.default = CircuitBreakerSettings {
            failure_threshold: 3,
            success_threshold: 1,
            reset_timeout_ms: 100,
            half_open_max_retries: 1,
        };
        config.cache = CacheSettings {
            sweep_interval_ms: 1_000,
            default_ttl_ms: 1_000,
        };
        config.worker_pool = WorkerPoolSettings {
            worker_count: 2,
            queue_capacity: 16,
        };
        config.retry.max_retries = 2;
        config.retry.initial_interval_ms = 10;
        config.retry.max_interval_ms = 100;
        config.retry.random_factor = 0.0;
        config.tracer.max_spans = 1_000;
        config
    }

    /// Shorter recovery and sweep periods than production
    pub fn for_development() -> Self {
        let mut config = Self::default();
        config.circuit_breakers.default.reset_timeout_ms = 5_000;
        config.cache.sweep_interval_ms = 60_000;
        config.worker_pool.worker_count = 2;
        config
    }

    /// Preset matching an environment name; unknown names get production defaults
    pub fn for_environment(environment: &str) -> Self {
        match environment {
            "test" => Self::for_test(),
            "development" => Self::for_development(),
            _ => Self::default(),
        }
    }

    /// Reject settings that would leave a component unusable
    pub fn validate(&self) -> ConfigResult<()> {
        if self.rate_limits.cleanup_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "rate_limits.cleanup_interval_ms",
                0,
                "must be greater than zero",
            ));
        }
        for (name, limiter) in &self.rate_limits.limiters {
            if limiter.limit == 0 {
                return Err(ConfigurationError::invalid_value(
                    format!("rate_limits.limiters.{name}.limit"),
                    0,
                    "must be greater than zero",
                ));
            }
            if limiter.window_ms == 0 {
                return Err(ConfigurationError::invalid_value(
                    format!("rate_limits.limiters.{name}.window_ms"),
                    0,
                    "must be greater than zero",
                ));
            }
        }

        validate_breaker("circuit_breakers.default", &self.circuit_breakers.default)?;
        for (name, settings) in &self.circuit_breakers.components {
            validate_breaker(&format!("circuit_breakers.components.{name}"), settings)?;
        }

        if self.cache.sweep_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "cache.sweep_interval_ms",
                0,
                "must be greater than zero",
            ));
        }

        if self.worker_pool.worker_count == 0 {
            return Err(ConfigurationError::invalid_value(
                "worker_pool.worker_count",
                0,
                "must be greater than zero",
            ));
        }
        if self.worker_pool.queue_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "worker_pool.queue_capacity",
                0,
                "must be greater than zero",
            ));
        }

        let retry = &self.retry;
        if retry.multiplier < 1.0 {
            return Err(ConfigurationError::invalid_value(
                "retry.multiplier",
                retry.multiplier,
                "must be at least 1.0",
            ));
        }
        if !(0.0..=1.0).contains(&retry.random_factor) {
            return Err(ConfigurationError::invalid_value(
                "retry.random_factor",
                retry.random_factor,
                "must be between 0.0 and 1.0",
            ));
        }
        if retry.max_interval_ms < retry.initial_interval_ms {
            return Err(ConfigurationError::validation_error(format!(
                "retry.max_interval_ms ({}) is below retry.initial_interval_ms ({})",
                retry.max_interval_ms, retry.initial_interval_ms
            )));
        }

        if self.tracer.max_spans == 0 {
            return Err(ConfigurationError::invalid_value(
                "tracer.max_spans",
                0,
                "must be greater than zero",
            ));
        }

        Ok(())
    }
}

fn validate_breaker(field: &str, settings: &CircuitBreakerSettings) -> ConfigResult<()> {
    for (name, value) in [
        ("failure_threshold", settings.failure_threshold),
        ("success_threshold", settings.success_threshold),
        ("half_open_max_retries", settings.half_open_max_retries),
    ] {
        if value == 0 {
            return Err(ConfigurationError::invalid_value(
                format!("{field}.{name}"),
                value,
                "must be greater than zero",
            ));
        }
    }
    if settings.reset_timeout_ms == 0 {
        return Err(ConfigurationError::invalid_value(
            format!("{field}.reset_timeout_ms"),
            0,
            "must be greater than zero",
        ));
    }
    // Half-open stops admitting after this many successes, so it must reach the close threshold
    if settings.half_open_max_retries < settings.success_threshold {
        return Err(ConfigurationError::validation_error(format!(
            "{field}.half_open_max_retries ({}) is below success_threshold ({}); the circuit could never close",
            settings.half_open_max_retries, settings.success_threshold
        )));
    }
    Ok(())
}
