//! # Span Registry
//!
//! Lightweight in-process spans for request and dependency timing. Spans are kept in
//! memory so health endpoints can show recent traces; the registry is bounded and
//! drops its oldest spans first. Nothing is exported or persisted.

use crate::constants::defaults;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpanStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanEvent {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub tags: BTreeMap<String, String>,
}

/// Serializable copy of a span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanSnapshot {
    pub id: String,
    pub trace_id: String,
    pub parent_id: Option<String>,
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration: Option<Duration>,
    pub tags: BTreeMap<String, String>,
    pub events: Vec<SpanEvent>,
    pub status: SpanStatus,
    pub error_message: Option<String>,
}

#[derive(Debug)]
struct SpanState {
    end_time: Option<DateTime<Utc>>,
    duration: Option<Duration>,
    tags: BTreeMap<String, String>,
    events: Vec<SpanEvent>,
    status: SpanStatus,
    error_message: Option<String>,
}

#[derive(Debug)]
struct SpanInner {
    id: String,
    trace_id: String,
    parent_id: Option<String>,
    name: String,
    started: Instant,
    start_time: DateTime<Utc>,
    state: Mutex<SpanState>,
}

/// Handle to one span; clones refer to the same span
#[derive(Debug, Clone)]
pub struct Span {
    inner: Arc<SpanInner>,
}

impl Span {
    fn new(name: &str, parent: Option<&Span>) -> Self {
        let (trace_id, parent_id) = match parent {
            Some(parent) => (parent.inner.trace_id.clone(), Some(parent.inner.id.clone())),
            None => (Uuid::new_v4().to_string(), None),
        };

        Self {
            inner: Arc::new(SpanInner {
                id: Uuid::new_v4().to_string(),
                trace_id,
                parent_id,
                name: name.to_string(),
                started: Instant::now(),
                start_time: Utc::now(),
                state: Mutex::new(SpanState {
                    end_time: None,
                    duration: None,
                    tags: BTreeMap::new(),
                    events: Vec::new(),
                    status: SpanStatus::Ok,
                    error_message: None,
                }),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn trace_id(&self) -> &str {
        &self.inner.trace_id
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.inner.parent_id.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn set_tag(&self, key: impl Into<String>, value: impl Into<String>) -> &Self {
        self.inner.state.lock().tags.insert(key.into(), value.into());
        self
    }

    pub fn log_event(&self, name: impl Into<String>, tags: BTreeMap<String, String>) -> &Self {
        self.inner.state.lock().events.push(SpanEvent {
            name: name.into(),
            timestamp: Utc::now(),
            tags,
        });
        self
    }

    pub fn set_error(&self, error: &dyn Display) -> &Self {
        let mut state = self.inner.state.lock();
        state.status = SpanStatus::Error;
        state.error_message = Some(error.to_string());
        self
    }

    /// Stamp the end time; only the first call counts
    pub fn finish(&self) -> Duration {
        let mut state = self.inner.state.lock();
        if let Some(duration) = state.duration {
            return duration;
        }
        let duration = self.inner.started.elapsed();
        state.end_time = Some(Utc::now());
        state.duration = Some(duration);
        duration
    }

    pub fn is_finished(&self) -> bool {
        self.inner.state.lock().duration.is_some()
    }

    pub fn status(&self) -> SpanStatus {
        self.inner.state.lock().status
    }

    pub fn snapshot(&self) -> SpanSnapshot {
        let state = self.inner.state.lock();
        SpanSnapshot {
            id: self.inner.id.clone(),
            trace_id: self.inner.trace_id.clone(),
            parent_id: self.inner.parent_id.clone(),
            name: self.inner.name.clone(),
            start_time: self.inner.start_time,
            end_time: state.end_time,
            duration: state.duration,
            tags: state.tags.clone(),
            events: state.events.clone(),
            status: state.status,
            error_message: state.error_message.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracerConfig {
    /// Spans retained before the oldest are dropped
    pub max_spans: usize,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            max_spans: defaults::TRACER_MAX_SPANS,
        }
    }
}

#[derive(Debug, Default)]
struct SpanStore {
    spans: HashMap<String, Span>,
    /// Span ids in creation order
    order: VecDeque<String>,
}

/// Creates spans and keeps the most recent ones for lookup
#[derive(Debug, Default)]
pub struct Tracer {
    config: TracerConfig,
    store: RwLock<SpanStore>,
}

impl Tracer {
    pub fn new(config: TracerConfig) -> Self {
        Self {
            config,
            store: RwLock::new(SpanStore::default()),
        }
    }

    /// Start a span; without a parent it begins a new trace
    pub fn start_span(&self, name: &str, parent: Option<&Span>) -> Span {
        let span = Span::new(name, parent);

        let mut store = self.store.write();
        store.spans.insert(span.id().to_string(), span.clone());
        store.order.push_back(span.id().to_string());
        while store.order.len() > self.config.max_spans {
            if let Some(oldest) = store.order.pop_front() {
                store.spans.remove(&oldest);
            }
        }

        span
    }

    pub fn finish_span(&self, span: &Span) {
        let duration = span.finish();
        debug!(
            span_id = %span.id(),
            trace_id = %span.trace_id(),
            name = %span.name(),
            duration_ms = duration.as_millis() as u64,
            status = ?span.status(),
            "Span finished"
        );
    }

    pub fn get_span(&self, span_id: &str) -> Option<Span> {
        self.store.read().spans.get(span_id).cloned()
    }

    /// Every retained span of a trace, oldest first
    pub fn get_trace(&self, trace_id: &str) -> Vec<Span> {
        let store = self.store.read();
        store
            .order
            .iter()
            .filter_map(|id| store.spans.get(id))
            .filter(|span| span.trace_id() == trace_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.store.read().spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.read().spans.is_empty()
    }
}

/// Run `f` inside a span, marking the span errored when `f` fails
pub async fn trace_function<F, Fut, T, E>(
    tracer: &Tracer,
    name: &str,
    parent: Option<&Span>,
    f: F,
) -> Result<T, E>
where
    F: FnOnce(Span) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let span = tracer.start_span(name, parent);
    let result = f(span.clone()).await;
    if let Err(error) = &result {
        span.set_error(error);
    }
    tracer.finish_span(&span);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_inherits_trace() {
        let tracer = Tracer::default();
        let root = tracer.start_span("http_request", None);
        let child = tracer.start_span("database_query", Some(&root));

        assert_eq!(child.trace_id(), root.trace_id());
        assert_eq!(child.parent_id(), Some(root.id()));
        assert!(root.parent_id().is_none());

        let other = tracer.start_span("other_request", None);
        assert_ne!(other.trace_id(), root.trace_id());

        let trace = tracer.get_trace(root.trace_id());
        let names: Vec<_> = trace.iter().map(|span| span.name().to_string()).collect();
        assert_eq!(names, vec!["http_request", "database_query"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finish_records_duration_once() {
        let tracer = Tracer::default();
        let span = tracer.start_span("sdk_generation", None);

        tokio::time::advance(Duration::from_millis(30)).await;
        tracer.finish_span(&span);
        tokio::time::advance(Duration::from_millis(30)).await;
        span.finish();

        let snapshot = span.snapshot();
        assert_eq!(snapshot.duration, Some(Duration::from_millis(30)));
        assert!(snapshot.end_time.is_some());
        assert_eq!(snapshot.status, SpanStatus::Ok);
    }

    #[test]
    fn test_tags_events_and_errors() {
        let tracer = Tracer::default();
        let span = tracer.start_span("postman_import", None);
        span.set_tag("collection", "abc123")
            .log_event("fetched", BTreeMap::from([("bytes".to_string(), "512".to_string())]));
        span.set_error(&"upstream returned 502");

        let stored = tracer.get_span(span.id()).unwrap().snapshot();
        assert_eq!(stored.tags.get("collection").map(String::as_str), Some("abc123"));
        assert_eq!(stored.events.len(), 1);
        assert_eq!(stored.status, SpanStatus::Error);
        assert_eq!(stored.error_message.as_deref(), Some("upstream returned 502"));

        let json = serde_json::to_value(&stored).unwrap();
        assert_eq!(json["status"], "ERROR");
    }

    #[test]
    fn test_oldest_spans_are_evicted() {
        let tracer = Tracer::new(TracerConfig { max_spans: 2 });
        let first = tracer.start_span("one", None);
        tracer.start_span("two", None);
        tracer.start_span("three", None);

        assert_eq!(tracer.len(), 2);
        assert!(tracer.get_span(first.id()).is_none());
    }

    #[tokio::test]
    async fn test_trace_function_marks_errors() {
        let tracer = Tracer::default();

        let ok: Result<u32, String> =
            trace_function(&tracer, "ok", None, |_span| async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let mut failed_span = None;
        let failed: Result<u32, String> = trace_function(&tracer, "failing", None, |span| {
            failed_span = Some(span);
            async { Err("timeout".to_string()) }
        })
        .await;
        assert!(failed.is_err());

        let span = failed_span.unwrap();
        assert!(span.is_finished());
        assert_eq!(span.status(), SpanStatus::Error);
    }
}
