//! Builders for the components under test.

use resilience_core::execution::FnTask;
use resilience_core::resilience::{CircuitBreaker, CircuitBreakerConfig, RateLimiter, RateLimiterConfig};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Install a test subscriber once; later calls are no-ops
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("resilience_core=debug")
        .with_test_writer()
        .try_init();
}

pub fn rate_limiter(limit: usize, window: Duration) -> RateLimiter {
    RateLimiter::new("test", RateLimiterConfig::new(limit, window))
}

pub fn circuit_breaker(
    failure_threshold: u32,
    success_threshold: u32,
    reset_timeout: Duration,
) -> CircuitBreaker {
    CircuitBreaker::new(
        "test_dependency",
        CircuitBreakerConfig {
            failure_threshold,
            success_threshold,
            reset_timeout,
            half_open_max_retries: success_threshold,
        },
    )
}

/// Task that increments `counter` when it runs
pub fn counting_task(name: &str, counter: &Arc<AtomicU32>) -> FnTask {
    let counter = Arc::clone(counter);
    FnTask::new(name, move |_cancel| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    })
}
