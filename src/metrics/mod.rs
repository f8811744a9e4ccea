//! # Metrics Module
//!
//! In-process metrics used by every resilience component. Metrics live only in
//! memory and are read back through [`MetricsCollector::get_metrics`] by health and
//! metrics endpoints.
//!
//! ## Usage
//!
//! ```rust
//! use resilience_core::metrics::MetricsCollector;
//!
//! let collector = MetricsCollector::new();
//!
//! collector
//!     .counter("sdk_generations_total", &[("language", "python"), ("status", "ok")])
//!     .inc();
//!
//! // Label order does not matter: this is the same metric
//! let same = collector.counter("sdk_generations_total", &[("status", "ok"), ("language", "python")]);
//! assert_eq!(same.get(), 1.0);
//!
//! let timer = collector.histogram("sdk_generation_duration_ms", &[]).timer();
//! // ... generate ...
//! timer.stop();
//! ```

pub mod collector;
pub mod request;

pub use collector::{Metric, MetricSnapshot, MetricTimer, MetricType, MetricsCollector};
pub use request::RequestMetrics;
