//! # Resilience Core
//!
//! Composition root that builds every shared component once and hands it to the
//! HTTP layer. All components report into one [`MetricsCollector`] and one
//! [`Tracer`], and every background task is bound to the core's shutdown token.

use crate::cache::{CacheRegistry, CacheStats};
use crate::config::{ConfigResult, ResilienceConfig};
use crate::constants::metric_names;
use crate::error::{ResilienceError, Result};
use crate::execution::WorkerPool;
use crate::logging::{log_admission_decision, log_dependency_call};
use crate::metrics::{MetricSnapshot, MetricsCollector};
use crate::resilience::{
    CircuitBreakerError, CircuitBreakerRegistry, RateLimitDecision, RateLimiterRegistry,
    SystemCircuitBreakerMetrics,
};
use crate::spans::Tracer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::info;

/// Read-only view for health and metrics endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub healthy: bool,
    pub circuit_breakers: BTreeMap<String, String>,
    pub circuit_breaker_summary: SystemCircuitBreakerMetrics,
    pub caches: BTreeMap<String, CacheStats>,
    pub metrics: BTreeMap<String, MetricSnapshot>,
    pub generated_at: DateTime<Utc>,
}

/// Shared resilience components for one process
#[derive(Debug)]
pub struct ResilienceCore {
    config: ResilienceConfig,
    metrics: Arc<MetricsCollector>,
    tracer: Arc<Tracer>,
    breakers: Arc<CircuitBreakerRegistry>,
    limiters: Arc<RateLimiterRegistry>,
    caches: Arc<CacheRegistry<serde_json::Value>>,
}

impl ResilienceCore {
    /// Build every component from a validated configuration.
    ///
    /// Must be called inside a tokio runtime for the background cleanup tasks to run.
    pub fn from_config(config: &ResilienceConfig) -> ConfigResult<Self> {
        config.validate()?;

        let metrics = Arc::new(MetricsCollector::new());
        let tracer = Arc::new(Tracer::new(config.tracer.to_tracer_config()));

        let breakers = CircuitBreakerRegistry::new(
            config.circuit_breakers.default.to_circuit_breaker_config(),
        )
        .with_component_configs(config.circuit_breakers.component_configs())
        .with_metrics(Arc::clone(&metrics));

        let limiters = RateLimiterRegistry::new().with_metrics(Arc::clone(&metrics));
        limiters.register_presets(config.rate_limits.to_rate_limiter_configs());

        let caches = CacheRegistry::new(config.cache.to_cache_config());

        info!(
            limiters = ?limiters.names(),
            worker_count = config.worker_pool.worker_count,
            "🛡️ Resilience core initialized"
        );

        Ok(Self {
            config: config.clone(),
            metrics,
            tracer,
            breakers: Arc::new(breakers),
            limiters: Arc::new(limiters),
            caches: Arc::new(caches),
        })
    }

    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    pub fn tracer(&self) -> &Arc<Tracer> {
        &self.tracer
    }

    pub fn circuit_breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    pub fn rate_limiters(&self) -> &Arc<RateLimiterRegistry> {
        &self.limiters
    }

    pub fn caches(&self) -> &Arc<CacheRegistry<serde_json::Value>> {
        &self.caches
    }

    /// New worker pool reporting into the shared collector; the caller starts it
    pub fn worker_pool(&self) -> WorkerPool {
        WorkerPool::with_metrics(
            self.config.worker_pool.to_worker_pool_config(),
            Arc::clone(&self.metrics),
        )
    }

    /// Rate-limit one request, surfacing rejection as an error
    pub fn admit(&self, limiter: &str, identity: &str) -> Result<RateLimitDecision> {
        let limiter_handle = self.limiters.get(limiter).ok_or_else(|| {
            ResilienceError::Configuration(format!("unknown rate limiter '{limiter}'"))
        })?;

        let decision = limiter_handle.check(identity);
        log_admission_decision(limiter, identity, decision.allowed, decision.remaining);
        decision.into_result(identity)
    }

    /// Call a dependency through its circuit breaker, inside a span, with latency
    /// and outcome metrics
    pub async fn call_dependency<F, Fut, T, E>(
        &self,
        dependency: &str,
        operation: F,
    ) -> std::result::Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Display,
    {
        let breaker = self.breakers.get(dependency);
        let span = self.tracer.start_span(dependency, None);
        span.set_tag("dependency", dependency);

        let started = Instant::now();
        let result = breaker.execute(operation).await;
        let duration = started.elapsed();

        let outcome = match &result {
            Ok(_) => "success",
            Err(CircuitBreakerError::CircuitOpen { .. }) => "rejected",
            Err(CircuitBreakerError::OperationFailed(_)) => "failure",
        };

        match &result {
            Ok(_) => log_dependency_call(dependency, outcome, duration, None),
            Err(error) => {
                let message = match error {
                    CircuitBreakerError::CircuitOpen { .. } => error.to_string(),
                    CircuitBreakerError::OperationFailed(inner) => inner.to_string(),
                };
                span.set_error(&message);
                log_dependency_call(dependency, outcome, duration, Some(&message));
            }
        }
        span.set_tag("outcome", outcome);
        self.tracer.finish_span(&span);

        self.metrics
            .counter(
                metric_names::DEPENDENCY_CALLS_TOTAL,
                &[("dependency", dependency), ("outcome", outcome)],
            )
            .inc();
        if outcome != "rejected" {
            self.metrics
                .histogram(
                    metric_names::DEPENDENCY_CALL_DURATION_MS,
                    &[("dependency", dependency)],
                )
                .observe(duration.as_secs_f64() * 1000.0);
        }

        result
    }

    pub fn health_snapshot(&self) -> HealthSnapshot {
        let circuit_breaker_summary = self.breakers.system_metrics();
        HealthSnapshot {
            healthy: circuit_breaker_summary.open_circuit_breakers == 0,
            circuit_breakers: self.breakers.get_status(),
            circuit_breaker_summary,
            caches: self.caches.get_metrics(),
            metrics: self.metrics.get_metrics(),
            generated_at: Utc::now(),
        }
    }

    /// Stop every background cleanup and sweep task
    pub fn shutdown(&self) {
        self.limiters.shutdown();
        self.caches.shutdown();
        info!("Resilience core shut down");
    }
}
