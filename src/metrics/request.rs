//! HTTP request metrics recorded by the middleware collaborator.

use super::MetricsCollector;
use crate::constants::metric_names;
use std::sync::Arc;
use tokio::time::Instant;

/// Records request counts and durations into a shared [`MetricsCollector`]
#[derive(Debug, Clone)]
pub struct RequestMetrics {
    collector: Arc<MetricsCollector>,
}

impl RequestMetrics {
    pub fn new(collector: Arc<MetricsCollector>) -> Self {
        Self { collector }
    }

    /// Track one finished request
    pub fn track_request(&self, path: &str, method: &str, status: u16, started: Instant) {
        let duration = started.elapsed();
        let status = status.to_string();

        self.collector
            .counter(
                metric_names::HTTP_REQUESTS_TOTAL,
                &[("path", path), ("method", method), ("status", &status)],
            )
            .inc();

        self.collector
            .histogram(
                metric_names::HTTP_REQUEST_DURATION_MS,
                &[("path", path), ("method", method)],
            )
            .observe(duration.as_secs_f64() * 1000.0);
    }
}
