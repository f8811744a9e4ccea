//! Named counters, gauges and histograms keyed by name plus a canonical label set.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    /// Cumulative value that only increases
    Counter,
    /// Value that can go up and down
    Gauge,
    /// Sampled observations (sum, count, min, max)
    Histogram,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
            MetricType::Histogram => "histogram",
        }
    }
}

#[derive(Debug)]
struct MetricState {
    value: f64,
    count: u64,
    min: Option<f64>,
    max: Option<f64>,
    last_updated: DateTime<Utc>,
}

/// A single metric series. Handles are shared (`Arc<Metric>`) and every mutation
/// happens under the metric's own lock.
#[derive(Debug)]
pub struct Metric {
    name: String,
    metric_type: MetricType,
    labels: BTreeMap<String, String>,
    state: RwLock<MetricState>,
}

impl Metric {
    fn new(name: &str, metric_type: MetricType, labels: BTreeMap<String, String>) -> Self {
        Self {
            name: name.to_string(),
            metric_type,
            labels,
            state: RwLock::new(MetricState {
                value: 0.0,
                count: 0,
                min: None,
                max: None,
                last_updated: Utc::now(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metric_type(&self) -> MetricType {
        self.metric_type
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    pub fn inc(&self) {
        self.add(1.0);
    }

    pub fn add(&self, value: f64) {
        let mut state = self.state.write();
        state.value += value;
        state.last_updated = Utc::now();
    }

    /// Overwrite the value (gauges)
    pub fn set(&self, value: f64) {
        let mut state = self.state.write();
        state.value = value;
        state.last_updated = Utc::now();
    }

    /// Record one observation (histograms). The metric value is the running sum.
    pub fn observe(&self, value: f64) {
        let mut state = self.state.write();
        state.value += value;
        state.count += 1;
        state.min = Some(state.min.map_or(value, |min| min.min(value)));
        state.max = Some(state.max.map_or(value, |max| max.max(value)));
        state.last_updated = Utc::now();
    }

    pub fn get(&self) -> f64 {
        self.state.read().value
    }

    /// Number of observations recorded through [`Metric::observe`]
    pub fn count(&self) -> u64 {
        self.state.read().count
    }

    /// Start timing; the elapsed milliseconds are observed when the timer stops.
    pub fn timer(self: &Arc<Self>) -> MetricTimer {
        MetricTimer {
            metric: Arc::clone(self),
            started: Instant::now(),
            recorded: false,
        }
    }

    pub fn snapshot(&self) -> MetricSnapshot {
        let state = self.state.read();
        MetricSnapshot {
            name: self.name.clone(),
            metric_type: self.metric_type,
            value: state.value,
            count: state.count,
            min: state.min,
            max: state.max,
            labels: self.labels.clone(),
            last_updated: state.last_updated,
        }
    }
}

/// Stop-handle returned by [`Metric::timer`]. Records on [`MetricTimer::stop`], or on
/// drop if it was never stopped explicitly.
#[derive(Debug)]
pub struct MetricTimer {
    metric: Arc<Metric>,
    started: Instant,
    recorded: bool,
}

impl MetricTimer {
    pub fn stop(mut self) -> Duration {
        self.record()
    }

    fn record(&mut self) -> Duration {
        let elapsed = self.started.elapsed();
        if !self.recorded {
            self.recorded = true;
            self.metric.observe(elapsed.as_secs_f64() * 1000.0);
        }
        elapsed
    }
}

impl Drop for MetricTimer {
    fn drop(&mut self) {
        if !self.recorded {
            self.record();
        }
    }
}

/// Serializable point-in-time view of one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub name: String,
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    pub value: f64,
    pub count: u64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub labels: BTreeMap<String, String>,
    pub last_updated: DateTime<Utc>,
}

/// Registry of lazily created metrics.
///
/// Metric identity is the name plus the label set. Labels are canonicalized into a
/// sorted map before the key is built, so the same labels supplied in any order
/// resolve to one metric.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    metrics: DashMap<String, Arc<Metric>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, name: &str, labels: &[(&str, &str)]) -> Arc<Metric> {
        self.get_or_create(name, MetricType::Counter, labels)
    }

    pub fn gauge(&self, name: &str, labels: &[(&str, &str)]) -> Arc<Metric> {
        self.get_or_create(name, MetricType::Gauge, labels)
    }

    pub fn histogram(&self, name: &str, labels: &[(&str, &str)]) -> Arc<Metric> {
        self.get_or_create(name, MetricType::Histogram, labels)
    }

    fn get_or_create(
        &self,
        name: &str,
        metric_type: MetricType,
        labels: &[(&str, &str)],
    ) -> Arc<Metric> {
        let labels = canonical_labels(labels);
        let key = metric_key(name, &labels);

        if let Some(existing) = self.metrics.get(&key) {
            let metric = Arc::clone(existing.value());
            drop(existing);
            if metric.metric_type != metric_type {
                warn!(
                    metric = %key,
                    registered = metric.metric_type.as_str(),
                    requested = metric_type.as_str(),
                    "Metric requested with a different type than registered"
                );
            }
            return metric;
        }

        // entry() holds the shard lock, so concurrent creators converge on one metric
        let metric = self
            .metrics
            .entry(key)
            .or_insert_with(|| {
                debug!(metric = name, metric_type = metric_type.as_str(), "Metric registered");
                Arc::new(Metric::new(name, metric_type, labels))
            })
            .clone();
        metric
    }

    /// Snapshot of every metric, keyed by its canonical key
    pub fn get_metrics(&self) -> BTreeMap<String, MetricSnapshot> {
        self.metrics
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

fn canonical_labels(labels: &[(&str, &str)]) -> BTreeMap<String, String> {
    labels
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

/// `name` or `name{k1="v1",k2="v2"}` with keys in sorted order
pub(crate) fn metric_key(name: &str, labels: &BTreeMap<String, String>) -> String {
    if labels.is_empty() {
        return name.to_string();
    }
    let rendered: Vec<String> = labels.iter().map(|(k, v)| format!("{k}=\"{v}\"")).collect();
    format!("{name}{{{}}}", rendered.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_order_does_not_change_identity() {
        let collector = MetricsCollector::new();
        let a = collector.counter("requests", &[("path", "/sdk"), ("method", "POST")]);
        let b = collector.counter("requests", &[("method", "POST"), ("path", "/sdk")]);

        assert!(Arc::ptr_eq(&a, &b));
        a.inc();
        b.inc();
        assert_eq!(a.get(), 2.0);
        assert_eq!(collector.len(), 1);
    }

    #[test]
    fn test_distinct_labels_are_distinct_metrics() {
        let collector = MetricsCollector::new();
        collector.counter("requests", &[("status", "200")]).inc();
        collector.counter("requests", &[("status", "500")]).add(3.0);
        collector.counter("requests", &[]).inc();

        let metrics = collector.get_metrics();
        assert_eq!(metrics.len(), 3);
        assert_eq!(metrics["requests{status=\"500\"}"].value, 3.0);
        assert_eq!(metrics["requests"].value, 1.0);
    }

    #[test]
    fn test_gauge_set_and_add() {
        let collector = MetricsCollector::new();
        let gauge = collector.gauge("active_workers", &[]);
        gauge.set(4.0);
        gauge.add(-1.0);
        assert_eq!(gauge.get(), 3.0);
        assert_eq!(gauge.snapshot().metric_type, MetricType::Gauge);
    }

    #[test]
    fn test_histogram_tracks_count_min_max() {
        let collector = MetricsCollector::new();
        let histogram = collector.histogram("latency_ms", &[("dependency", "db")]);
        histogram.observe(10.0);
        histogram.observe(30.0);
        histogram.observe(20.0);

        let snapshot = histogram.snapshot();
        assert_eq!(snapshot.value, 60.0);
        assert_eq!(snapshot.count, 3);
        assert_eq!(snapshot.min, Some(10.0));
        assert_eq!(snapshot.max, Some(30.0));
    }

    #[test]
    fn test_existing_type_wins_on_mismatch() {
        let collector = MetricsCollector::new();
        let counter = collector.counter("mixed", &[]);
        let again = collector.gauge("mixed", &[]);
        assert!(Arc::ptr_eq(&counter, &again));
        assert_eq!(again.metric_type(), MetricType::Counter);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_records_elapsed_milliseconds() {
        let collector = MetricsCollector::new();
        let histogram = collector.histogram("task_duration_ms", &[]);

        let timer = histogram.timer();
        tokio::time::advance(Duration::from_millis(25)).await;
        let elapsed = timer.stop();

        assert_eq!(elapsed, Duration::from_millis(25));
        assert_eq!(histogram.count(), 1);
        assert!((histogram.get() - 25.0).abs() < 0.001);
    }

    #[test]
    fn test_timer_records_on_drop() {
        let collector = MetricsCollector::new();
        let histogram = collector.histogram("dropped_timer_ms", &[]);
        {
            let _timer = histogram.timer();
        }
        assert_eq!(histogram.count(), 1);
    }

    #[test]
    fn test_metric_key_format() {
        let labels = canonical_labels(&[("b", "2"), ("a", "1")]);
        assert_eq!(metric_key("m", &labels), "m{a=\"1\",b=\"2\"}");
        assert_eq!(metric_key("m", &BTreeMap::new()), "m");
    }

    #[test]
    fn test_concurrent_creation_converges() {
        let collector = Arc::new(MetricsCollector::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let collector = Arc::clone(&collector);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        collector.counter("shared", &[("x", "1"), ("y", "2")]).inc();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(collector.len(), 1);
        assert_eq!(collector.counter("shared", &[("y", "2"), ("x", "1")]).get(), 800.0);
    }
}
