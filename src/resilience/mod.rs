//! # Resilience Module
//!
//! Admission control and fault isolation for downstream dependencies: the database,
//! external SDK-generation tools and third-party HTTP APIs.
//!
//! ## Architecture
//!
//! - **Rate Limiting**: per-identity sliding windows decide whether a request may start
//! - **Circuit Breakers**: stop calling a failing dependency for a cooldown period
//! - **Retry**: exponential backoff with jitter for transient failures
//! - **Registries**: named, lazily created instances shared by every caller
//!
//! ## Usage
//!
//! ```rust,no_run
//! use resilience_core::resilience::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CircuitBreakerConfig {
//!     failure_threshold: 5,
//!     success_threshold: 2,
//!     reset_timeout: Duration::from_secs(30),
//!     half_open_max_retries: 2,
//! };
//!
//! let circuit_breaker = CircuitBreaker::new("postman_api", config);
//!
//! let body = circuit_breaker
//!     .execute(|| async { Ok::<_, std::io::Error>("collection") })
//!     .await?;
//! # let _ = body;
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod metrics;
pub mod rate_limiter;
pub mod registry;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerError, CircuitState};
pub use config::{CircuitBreakerConfig, RateLimiterConfig};
pub use metrics::{CircuitBreakerMetrics, SystemCircuitBreakerMetrics};
pub use rate_limiter::{RateLimitDecision, RateLimiter, RateLimiterRegistry};
pub use registry::CircuitBreakerRegistry;
pub use retry::{
    retry_with_backoff, retry_with_backoff_if, BackoffSchedule, RetryConfig, RetryError,
};
