//! # Circuit Breaker Implementation
//!
//! Provides fault isolation for downstream dependencies. This implementation follows
//! the classic circuit breaker pattern with three states: Closed (normal operation),
//! Open (failing fast), and Half-Open (bounded probing of recovery).
//!
//! State, counters and timestamps live behind one mutex so the lazy Open → HalfOpen
//! transition performed by [`CircuitBreaker::allow_request`] is atomic with the
//! admission decision. No operation in this module blocks beyond that short
//! critical section.

use crate::constants::metric_names;
use crate::metrics::MetricsCollector;
use crate::resilience::{CircuitBreakerConfig, CircuitBreakerMetrics};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed = 0,
    /// Failure mode - all calls fail fast without executing
    Open = 1,
    /// Testing recovery - limited calls allowed to test dependency health
    HalfOpen = 2,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Open, // Default to safest state
        }
    }
}

/// Errors returned by [`CircuitBreaker::execute`]
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open, the operation was not attempted
    #[error("Circuit breaker is open for {component}")]
    CircuitOpen { component: String },

    /// Operation ran and failed; the failure was recorded
    #[error("Operation failed: {0}")]
    OperationFailed(E),
}

impl<E> CircuitBreakerError<E> {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, CircuitBreakerError::CircuitOpen { .. })
    }

    /// The operation's own error, if the operation ran
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            CircuitBreakerError::OperationFailed(error) => Some(error),
            CircuitBreakerError::CircuitOpen { .. } => None,
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    /// Consecutive failures while closed
    failure_count: u32,
    /// Successes while half-open
    success_count: u32,
    last_state_change: Instant,
    last_state_change_at: DateTime<Utc>,
    total_calls: u64,
    total_successes: u64,
    total_failures: u64,
    rejected_calls: u64,
    timed_calls: u64,
    total_duration: Duration,
}

/// One mutable breaker per dependency, shared by every caller
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Component name for logging and metrics
    name: String,

    config: CircuitBreakerConfig,

    inner: Mutex<BreakerState>,

    collector: Option<Arc<MetricsCollector>>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given name and configuration
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        info!(
            component = %name,
            failure_threshold = config.failure_threshold,
            success_threshold = config.success_threshold,
            reset_timeout_ms = config.reset_timeout.as_millis() as u64,
            half_open_max_retries = config.half_open_max_retries,
            "🛡️ Circuit breaker initialized"
        );

        Self {
            name,
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_state_change: Instant::now(),
                last_state_change_at: Utc::now(),
                total_calls: 0,
                total_successes: 0,
                total_failures: 0,
                rejected_calls: 0,
                timed_calls: 0,
                total_duration: Duration::ZERO,
            }),
            collector: None,
        }
    }

    /// Publish state transitions to a shared collector
    pub fn with_metrics(mut self, collector: Arc<MetricsCollector>) -> Self {
        collector
            .gauge(metric_names::CIRCUIT_BREAKER_STATE, &[("component", &self.name)])
            .set(CircuitState::Closed as u8 as f64);
        self.collector = Some(collector);
        self
    }

    /// Get current circuit state
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Decide whether a call may proceed.
    ///
    /// Closed admits everything. Open admits nothing until `reset_timeout` has elapsed
    /// since the circuit opened; the first call after that moves the circuit to
    /// HalfOpen and is admitted. HalfOpen admits while fewer than
    /// `half_open_max_retries` probes have succeeded.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock();

        let allowed = match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                if inner.last_state_change.elapsed() >= self.config.reset_timeout {
                    self.transition(&mut inner, CircuitState::HalfOpen);
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => inner.success_count < self.config.half_open_max_retries,
        };

        if !allowed {
            inner.rejected_calls += 1;
            debug!(component = %self.name, state = %inner.state, "Request rejected by circuit breaker");
        }
        allowed
    }

    /// Record a successful call
    pub fn record_success(&self) {
        self.record_outcome(true, None);
    }

    /// Record a failed call
    pub fn record_failure(&self) {
        self.record_outcome(false, None);
    }

    /// Execute an operation with circuit breaker protection
    pub async fn execute<F, T, E, Fut>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.allow_request() {
            return Err(CircuitBreakerError::CircuitOpen {
                component: self.name.clone(),
            });
        }

        let start_time = Instant::now();
        let result = operation().await;
        let duration = start_time.elapsed();

        self.record_outcome(result.is_ok(), Some(duration));

        result.map_err(CircuitBreakerError::OperationFailed)
    }

    fn record_outcome(&self, success: bool, duration: Option<Duration>) {
        let mut inner = self.inner.lock();
        inner.total_calls += 1;
        if let Some(duration) = duration {
            inner.timed_calls += 1;
            inner.total_duration = inner.total_duration.saturating_add(duration);
        }

        if success {
            inner.total_successes += 1;
            match inner.state {
                CircuitState::Closed => {
                    inner.failure_count = 0;
                }
                CircuitState::HalfOpen => {
                    inner.success_count += 1;
                    if inner.success_count >= self.config.success_threshold {
                        self.transition(&mut inner, CircuitState::Closed);
                    }
                }
                CircuitState::Open => {
                    warn!(component = %self.name, "Success recorded while circuit is open");
                }
            }
        } else {
            inner.total_failures += 1;
            debug!(
                component = %self.name,
                duration_ms = duration.map(|d| d.as_millis() as u64),
                "🔴 Operation failed"
            );
            match inner.state {
                CircuitState::Closed => {
                    inner.failure_count += 1;
                    if inner.failure_count >= self.config.failure_threshold {
                        self.transition(&mut inner, CircuitState::Open);
                    }
                }
                CircuitState::HalfOpen => {
                    // Any failure while probing reopens immediately
                    self.transition(&mut inner, CircuitState::Open);
                }
                CircuitState::Open => {}
            }
        }
    }

    /// Apply a state change; caller holds the lock
    fn transition(&self, inner: &mut BreakerState, to: CircuitState) {
        let from = inner.state;
        let time_in_previous = inner.last_state_change.elapsed();

        inner.state = to;
        inner.last_state_change = Instant::now();
        inner.last_state_change_at = Utc::now();

        match to {
            CircuitState::Open => {
                warn!(
                    component = %self.name,
                    from = %from,
                    failures = inner.failure_count,
                    failure_threshold = self.config.failure_threshold,
                    reset_timeout_ms = self.config.reset_timeout.as_millis() as u64,
                    "🔴 Circuit breaker opened (failing fast)"
                );
                inner.success_count = 0;
            }
            CircuitState::HalfOpen => {
                inner.success_count = 0;
                inner.failure_count = 0;
                info!(
                    component = %self.name,
                    open_for_ms = time_in_previous.as_millis() as u64,
                    success_threshold = self.config.success_threshold,
                    "🟡 Circuit breaker half-open (testing recovery)"
                );
            }
            CircuitState::Closed => {
                inner.success_count = 0;
                inner.failure_count = 0;
                info!(
                    component = %self.name,
                    from = %from,
                    total_calls = inner.total_calls,
                    "🟢 Circuit breaker closed (recovered)"
                );
            }
        }

        if let Some(collector) = &self.collector {
            collector
                .gauge(metric_names::CIRCUIT_BREAKER_STATE, &[("component", &self.name)])
                .set(to as u8 as f64);
            collector
                .counter(
                    metric_names::CIRCUIT_BREAKER_TRANSITIONS_TOTAL,
                    &[("component", &self.name), ("to", to.as_str())],
                )
                .inc();
        }
    }

    /// Force circuit to open state (for emergency situations)
    pub fn force_open(&self) {
        warn!(component = %self.name, "🚨 Circuit breaker forced open");
        let mut inner = self.inner.lock();
        self.transition(&mut inner, CircuitState::Open);
    }

    /// Force circuit to closed state (for emergency recovery)
    pub fn force_closed(&self) {
        warn!(component = %self.name, "🚨 Circuit breaker forced closed");
        let mut inner = self.inner.lock();
        self.transition(&mut inner, CircuitState::Closed);
    }

    /// Get current metrics snapshot
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let inner = self.inner.lock();

        let (failure_rate, success_rate) = if inner.total_calls > 0 {
            (
                inner.total_failures as f64 / inner.total_calls as f64,
                inner.total_successes as f64 / inner.total_calls as f64,
            )
        } else {
            (0.0, 0.0)
        };

        let average_duration = average_duration(inner.total_duration, inner.timed_calls);

        CircuitBreakerMetrics {
            component: self.name.clone(),
            current_state: inner.state,
            total_calls: inner.total_calls,
            success_count: inner.total_successes,
            failure_count: inner.total_failures,
            rejected_calls: inner.rejected_calls,
            consecutive_failures: inner.failure_count,
            half_open_successes: inner.success_count,
            failure_rate,
            success_rate,
            average_duration,
            last_state_change: inner.last_state_change_at,
        }
    }

    /// Check if circuit is healthy (closed state with low failure rate)
    pub fn is_healthy(&self) -> bool {
        let inner = self.inner.lock();
        if inner.state != CircuitState::Closed {
            return false;
        }

        if inner.total_calls < 10 {
            // Too few calls to determine health
            return true;
        }

        let failure_rate = inner.total_failures as f64 / inner.total_calls as f64;
        failure_rate < 0.1
    }
}

fn average_duration(total: Duration, calls: u64) -> Duration {
    if calls == 0 {
        Duration::ZERO
    } else {
        total.div_f64(calls as f64)
    }
}
