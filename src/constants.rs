//! # System Constants
//!
//! Metric names, default tunables and well-known limiter names shared by the
//! resilience components.

/// Metric names published to the [`crate::metrics::MetricsCollector`]
pub mod metric_names {
    // Worker pool
    pub const WORKER_POOL_TASKS_SUBMITTED: &str = "worker_pool_tasks_submitted";
    pub const WORKER_POOL_TASKS_COMPLETED: &str = "worker_pool_tasks_completed";
    pub const WORKER_POOL_TASKS_FAILED: &str = "worker_pool_tasks_failed";
    pub const WORKER_POOL_TASK_DURATION_MS: &str = "worker_pool_task_duration_ms";
    pub const WORKER_POOL_QUEUE_SIZE: &str = "worker_pool_queue_size";
    pub const WORKER_POOL_ACTIVE_WORKERS: &str = "worker_pool_active_workers";

    // Admission control
    pub const RATE_LIMITER_REQUESTS_TOTAL: &str = "rate_limiter_requests_total";
    pub const CIRCUIT_BREAKER_STATE: &str = "circuit_breaker_state";
    pub const CIRCUIT_BREAKER_TRANSITIONS_TOTAL: &str = "circuit_breaker_transitions_total";

    // Dependency calls made through the composition layer
    pub const DEPENDENCY_CALLS_TOTAL: &str = "dependency_calls_total";
    pub const DEPENDENCY_CALL_DURATION_MS: &str = "dependency_call_duration_ms";

    // HTTP collaborator
    pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
    pub const HTTP_REQUEST_DURATION_MS: &str = "http_request_duration_ms";
}

/// Well-known rate limiter names
pub mod limiters {
    pub const API: &str = "api";
    pub const SDK: &str = "sdk";
    pub const PUBLIC_API: &str = "public_api";
}

/// Default tunables
pub mod defaults {
    use std::time::Duration;

    pub const CIRCUIT_FAILURE_THRESHOLD: u32 = 5;
    pub const CIRCUIT_SUCCESS_THRESHOLD: u32 = 2;
    pub const CIRCUIT_RESET_TIMEOUT: Duration = Duration::from_secs(30);
    pub const CIRCUIT_HALF_OPEN_MAX_RETRIES: u32 = 2;

    pub const RATE_LIMITER_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

    pub const CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(300);
    pub const CACHE_DEFAULT_TTL: Duration = Duration::from_secs(300);

    pub const WORKER_COUNT: usize = 4;
    pub const WORKER_QUEUE_CAPACITY: usize = 100;

    pub const RETRY_MAX_RETRIES: u32 = 3;
    pub const RETRY_INITIAL_INTERVAL: Duration = Duration::from_millis(100);
    pub const RETRY_MAX_INTERVAL: Duration = Duration::from_secs(10);
    pub const RETRY_MULTIPLIER: f64 = 2.0;
    pub const RETRY_RANDOM_FACTOR: f64 = 0.1;

    pub const TRACER_MAX_SPANS: usize = 10_000;
}
