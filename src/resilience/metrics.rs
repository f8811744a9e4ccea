//! Circuit breaker metrics snapshots exposed to health endpoints.

use crate::resilience::CircuitState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Point-in-time view of a single circuit breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    pub component: String,
    pub current_state: CircuitState,
    pub total_calls: u64,
    pub success_count: u64,
    pub failure_count: u64,
    /// Requests refused without calling the dependency
    pub rejected_calls: u64,
    pub consecutive_failures: u32,
    pub half_open_successes: u32,
    pub failure_rate: f64,
    pub success_rate: f64,
    /// Mean duration of calls made through `execute`
    pub average_duration: Duration,
    pub last_state_change: DateTime<Utc>,
}

/// Aggregate over every registered breaker
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemCircuitBreakerMetrics {
    pub total_circuit_breakers: usize,
    pub closed_circuit_breakers: usize,
    pub open_circuit_breakers: usize,
    pub half_open_circuit_breakers: usize,
    pub total_calls: u64,
    pub total_rejected_calls: u64,
}

impl SystemCircuitBreakerMetrics {
    pub fn from_breakers<'a>(breakers: impl IntoIterator<Item = &'a CircuitBreakerMetrics>) -> Self {
        breakers
            .into_iter()
            .fold(Self::default(), |mut acc, breaker| {
                acc.total_circuit_breakers += 1;
                match breaker.current_state {
                    CircuitState::Closed => acc.closed_circuit_breakers += 1,
                    CircuitState::Open => acc.open_circuit_breakers += 1,
                    CircuitState::HalfOpen => acc.half_open_circuit_breakers += 1,
                }
                acc.total_calls += breaker.total_calls;
                acc.total_rejected_calls += breaker.rejected_calls;
                acc
            })
    }

    /// Share of breakers currently refusing or probing traffic
    pub fn degraded_ratio(&self) -> f64 {
        if self.total_circuit_breakers == 0 {
            return 0.0;
        }
        (self.open_circuit_breakers + self.half_open_circuit_breakers) as f64
            / self.total_circuit_breakers as f64
    }
}
