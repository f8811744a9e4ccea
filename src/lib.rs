#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Resilience Core
//!
//! Admission control, fault isolation, caching and bounded task execution for the
//! downstream dependencies of an HTTP service: its database, external SDK-generation
//! tools and third-party HTTP APIs.
//!
//! ## Overview
//!
//! An inbound operation is first checked against a rate limiter for its identity. If
//! admitted, calls to a dependency are guarded by that dependency's circuit breaker;
//! idempotent lookups may be served from a TTL cache first; transient failures can be
//! retried with exponential backoff; long-running work is handed to a bounded worker
//! pool instead of running inline. Every component reports into a shared metrics
//! collector and span registry.
//!
//! ## Module Organization
//!
//! - [`resilience`] - Rate limiters, circuit breakers, retry and their registries
//! - [`cache`] - TTL cache with background eviction
//! - [`execution`] - Tasks and the bounded worker pool
//! - [`metrics`] - Counters, gauges and histograms keyed by canonical label sets
//! - [`spans`] - In-memory span registry
//! - [`config`] - Layered configuration loading and validation
//! - [`core`] - Composition root wiring the components together
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use resilience_core::config::ResilienceConfig;
//! use resilience_core::ResilienceCore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! resilience_core::logging::init_structured_logging();
//!
//! let core = ResilienceCore::from_config(&ResilienceConfig::default())?;
//!
//! // Rate-limit the caller, then call the database through its circuit breaker
//! let decision = core.admit("api", "10.0.0.1")?;
//! let rows = core
//!     .call_dependency("database", || async { Ok::<_, std::io::Error>(vec![1, 2, 3]) })
//!     .await?;
//!
//! println!("{} rows, {} requests left", rows.len(), decision.remaining);
//! core.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod constants;
pub mod core;
pub mod error;
pub mod execution;
pub mod logging;
pub mod metrics;
pub mod resilience;
pub mod spans;

pub use crate::core::{HealthSnapshot, ResilienceCore};
pub use cache::{Cache, CacheConfig, CacheRegistry, CacheStats};
pub use config::{ConfigManager, ConfigurationError, ResilienceConfig};
pub use error::{Classify, ErrorKind, ResilienceError, Result};
pub use execution::{FnTask, Task, WorkerPool, WorkerPoolConfig};
pub use metrics::{MetricsCollector, RequestMetrics};
pub use resilience::{
    retry_with_backoff, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError,
    CircuitBreakerRegistry, CircuitState, RateLimitDecision, RateLimiter, RateLimiterConfig,
    RateLimiterRegistry, RetryConfig, RetryError,
};
pub use spans::{Span, Tracer};
