//! # Sliding-Window Rate Limiter
//!
//! Each identity keeps the timestamps of its admitted requests. A request is admitted
//! when fewer than `limit` of those timestamps are younger than `window`; rejected
//! requests are not recorded. Timestamps are compacted lazily on every access and by
//! a periodic cleanup task that also forgets idle identities.
//!
//! Per-identity state lives in a sharded [`DashMap`], so all mutation for one identity
//! is serialized by its shard lock while unrelated identities proceed in parallel.

use crate::constants::{limiters, metric_names};
use crate::error::{ResilienceError, Result};
use crate::metrics::MetricsCollector;
use crate::resilience::RateLimiterConfig;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Outcome of a [`RateLimiter::check`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: usize,
    /// Requests still available in the current window
    pub remaining: usize,
    /// Time until the oldest counted request leaves the window
    pub reset_after: Duration,
}

impl RateLimitDecision {
    /// Values for the `X-RateLimit-*` response headers
    pub fn headers(&self) -> [(&'static str, String); 3] {
        [
            ("X-RateLimit-Limit", self.limit.to_string()),
            ("X-RateLimit-Remaining", self.remaining.to_string()),
            ("X-RateLimit-Reset", self.reset_after.as_secs().to_string()),
        ]
    }

    /// Convert a rejection into [`ResilienceError::RateLimitExceeded`]
    pub fn into_result(self, identity: &str) -> Result<Self> {
        if self.allowed {
            Ok(self)
        } else {
            Err(ResilienceError::RateLimitExceeded {
                identity: identity.to_string(),
                limit: self.limit,
                retry_after: self.reset_after,
            })
        }
    }
}

/// Per-identity sliding-window limiter
#[derive(Debug)]
pub struct RateLimiter {
    name: String,
    config: RateLimiterConfig,
    requests: DashMap<String, VecDeque<Instant>>,
    collector: Option<Arc<MetricsCollector>>,
    shutdown: CancellationToken,
}

impl RateLimiter {
    pub fn new(name: impl Into<String>, config: RateLimiterConfig) -> Self {
        Self {
            name: name.into(),
            config,
            requests: DashMap::new(),
            collector: None,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_metrics(mut self, collector: Arc<MetricsCollector>) -> Self {
        self.collector = Some(collector);
        self
    }

    /// Stop the cleanup task when `token` is cancelled
    pub fn with_shutdown_token(mut self, token: &CancellationToken) -> Self {
        self.shutdown = token.child_token();
        self
    }

    /// Share the limiter and spawn its periodic cleanup.
    ///
    /// Outside a tokio runtime no cleanup task is spawned; lazy compaction on access
    /// still keeps every identity's window exact.
    pub fn start(self) -> Arc<Self> {
        let limiter = Arc::new(self);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(Self::cleanup_loop(
                    Arc::downgrade(&limiter),
                    limiter.config.cleanup_interval,
                    limiter.shutdown.clone(),
                ));
            }
            Err(_) => {
                warn!(limiter = %limiter.name, "No tokio runtime available; rate limiter cleanup disabled");
            }
        }
        limiter
    }

    async fn cleanup_loop(limiter: Weak<Self>, period: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let Some(limiter) = limiter.upgrade() else { break };
                    limiter.cleanup();
                }
            }
        }
        debug!("Rate limiter cleanup task stopped");
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Admit or reject one request for `identity`
    pub fn allow(&self, identity: &str) -> bool {
        self.check(identity).allowed
    }

    /// Admit or reject one request and report the resulting window state
    pub fn check(&self, identity: &str) -> RateLimitDecision {
        let limit = self.config.limit;
        let window = self.config.window;

        let decision = {
            let mut entry = self.requests.entry(identity.to_string()).or_default();
            let now = Instant::now();
            prune(&mut entry, now, window);

            let allowed = entry.len() < limit;
            if allowed {
                entry.push_back(now);
            }

            RateLimitDecision {
                allowed,
                limit,
                remaining: limit.saturating_sub(entry.len()),
                reset_after: reset_after(&entry, now, window),
            }
        };

        if !decision.allowed {
            debug!(
                limiter = %self.name,
                identity = %identity,
                limit = limit,
                window_ms = window.as_millis() as u64,
                "Rate limit exceeded"
            );
        }
        self.record_outcome(decision.allowed);
        decision
    }

    /// Requests still available to `identity` in the current window; never mutates
    pub fn remaining(&self, identity: &str) -> usize {
        let now = Instant::now();
        let window = self.config.window;
        let used = self
            .requests
            .get(identity)
            .map(|entry| entry.iter().filter(|ts| now.duration_since(**ts) < window).count())
            .unwrap_or(0);
        self.config.limit.saturating_sub(used)
    }

    /// Prune expired timestamps everywhere and forget idle identities
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let window = self.config.window;
        let before = self.requests.len();

        self.requests.retain(|_, timestamps| {
            prune(timestamps, now, window);
            !timestamps.is_empty()
        });

        let removed = before.saturating_sub(self.requests.len());
        if removed > 0 {
            debug!(limiter = %self.name, removed = removed, "Rate limiter dropped idle identities");
        }
        removed
    }

    /// Number of identities with state in memory
    pub fn tracked_identities(&self) -> usize {
        self.requests.len()
    }

    /// Stop the background cleanup task
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    fn record_outcome(&self, allowed: bool) {
        if let Some(collector) = &self.collector {
            let outcome = if allowed { "allowed" } else { "rejected" };
            collector
                .counter(
                    metric_names::RATE_LIMITER_REQUESTS_TOTAL,
                    &[("limiter", &self.name), ("outcome", outcome)],
                )
                .inc();
        }
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Timestamps are appended in order, so stale ones are always at the front
fn prune(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = timestamps.front() {
        if now.duration_since(*oldest) >= window {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}

fn reset_after(timestamps: &VecDeque<Instant>, now: Instant, window: Duration) -> Duration {
    timestamps
        .front()
        .map(|oldest| window.saturating_sub(now.duration_since(*oldest)))
        .unwrap_or(Duration::ZERO)
}

/// Named limiters shared by the HTTP middleware
#[derive(Debug)]
pub struct RateLimiterRegistry {
    limiters: RwLock<HashMap<String, Arc<RateLimiter>>>,
    collector: Option<Arc<MetricsCollector>>,
    shutdown: CancellationToken,
}

impl RateLimiterRegistry {
    pub fn new() -> Self {
        Self {
            limiters: RwLock::new(HashMap::new()),
            collector: None,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_metrics(mut self, collector: Arc<MetricsCollector>) -> Self {
        self.collector = Some(collector);
        self
    }

    /// Registry preloaded with the `api`, `sdk` and `public_api` limiters
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register_presets(default_presets());
        registry
    }

    /// Register every limiter in `presets`, replacing existing ones with the same name
    pub fn register_presets(&self, presets: impl IntoIterator<Item = (String, RateLimiterConfig)>) {
        for (name, config) in presets {
            self.register(&name, config);
        }
    }

    /// Create and start a limiter under `name`
    pub fn register(&self, name: &str, config: RateLimiterConfig) -> Arc<RateLimiter> {
        let mut limiter = RateLimiter::new(name, config.clone())
            .with_shutdown_token(&self.shutdown);
        if let Some(collector) = &self.collector {
            limiter = limiter.with_metrics(Arc::clone(collector));
        }
        let limiter = limiter.start();

        if let Some(previous) = self
            .limiters
            .write()
            .insert(name.to_string(), Arc::clone(&limiter))
        {
            previous.shutdown();
        }

        info!(
            limiter = %name,
            limit = config.limit,
            window_ms = config.window.as_millis() as u64,
            "Rate limiter registered"
        );
        limiter
    }

    pub fn get(&self, name: &str) -> Option<Arc<RateLimiter>> {
        self.limiters.read().get(name).cloned()
    }

    /// Remaining allowance per limiter for `identity`
    pub fn remaining(&self, identity: &str) -> BTreeMap<String, usize> {
        self.limiters
            .read()
            .iter()
            .map(|(name, limiter)| (name.clone(), limiter.remaining(identity)))
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.limiters.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Stop every limiter's cleanup task
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Default for RateLimiterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Limits applied by the HTTP layer when nothing else is configured
pub fn default_presets() -> Vec<(String, RateLimiterConfig)> {
    let minute = Duration::from_secs(60);
    vec![
        (limiters::API.to_string(), RateLimiterConfig::new(100, minute)),
        (limiters::SDK.to_string(), RateLimiterConfig::new(10, minute)),
        (limiters::PUBLIC_API.to_string(), RateLimiterConfig::new(50, minute)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(limit: usize, window_ms: u64) -> RateLimiter {
        RateLimiter::new("test", RateLimiterConfig::new(limit, Duration::from_millis(window_ms)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejects_past_limit_then_recovers() {
        let limiter = limiter(3, 1000);

        assert!(limiter.allow("a"));
        assert!(limiter.allow("a"));
        assert!(limiter.allow("a"));
        assert!(!limiter.allow("a"));

        tokio::time::advance(Duration::from_millis(1100)).await;
        assert!(limiter.allow("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_boundary_is_exclusive() {
        let limiter = limiter(1, 1000);
        assert!(limiter.allow("a"));

        tokio::time::advance(Duration::from_millis(999)).await;
        assert!(!limiter.allow("a"));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(limiter.allow("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejections_are_not_recorded() {
        let limiter = limiter(2, 1000);
        assert!(limiter.allow("a"));
        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(limiter.allow("a"));

        for _ in 0..10 {
            assert!(!limiter.allow("a"));
        }

        // Only the first admission has aged out; rejected calls left nothing behind
        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(limiter.remaining("a"), 1);
        assert!(limiter.allow("a"));
    }

    #[test]
    fn test_identities_are_independent() {
        let limiter = limiter(1, 60_000);
        assert!(limiter.allow("a"));
        assert!(!limiter.allow("a"));
        assert!(limiter.allow("b"));
    }

    #[test]
    fn test_remaining_is_read_only_and_never_negative() {
        let limiter = limiter(2, 60_000);
        assert_eq!(limiter.remaining("unknown"), 2);
        assert_eq!(limiter.tracked_identities(), 0);

        limiter.allow("a");
        limiter.allow("a");
        limiter.allow("a");
        assert_eq!(limiter.remaining("a"), 0);
        assert_eq!(limiter.remaining("a"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_reports_headers() {
        let limiter = limiter(2, 60_000);
        let first = limiter.check("a");
        assert!(first.allowed);
        assert_eq!(first.remaining, 1);
        assert_eq!(first.reset_after, Duration::from_secs(60));

        tokio::time::advance(Duration::from_secs(15)).await;
        limiter.check("a");
        let rejected = limiter.check("a");
        assert!(!rejected.allowed);
        assert_eq!(rejected.remaining, 0);

        let headers = rejected.headers();
        assert_eq!(headers[0], ("X-RateLimit-Limit", "2".to_string()));
        assert_eq!(headers[1], ("X-RateLimit-Remaining", "0".to_string()));
        assert_eq!(headers[2], ("X-RateLimit-Reset", "45".to_string()));

        let err = rejected.into_result("a").unwrap_err();
        assert!(err.is_admission_denied());
        match err {
            ResilienceError::RateLimitExceeded { retry_after, .. } => {
                assert_eq!(retry_after, Duration::from_secs(45));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_drops_idle_identities() {
        let limiter = limiter(5, 1000);
        limiter.allow("a");
        limiter.allow("b");
        tokio::time::advance(Duration::from_millis(600)).await;
        limiter.allow("b");
        tokio::time::advance(Duration::from_millis(500)).await;

        assert_eq!(limiter.cleanup(), 1);
        assert_eq!(limiter.tracked_identities(), 1);
        assert_eq!(limiter.remaining("b"), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_cleanup_runs_until_shutdown() {
        let config = RateLimiterConfig::new(5, Duration::from_millis(100))
            .with_cleanup_interval(Duration::from_millis(500));
        let limiter = RateLimiter::new("bg", config).start();

        limiter.allow("a");
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(limiter.tracked_identities(), 0);

        limiter.shutdown();
        limiter.allow("b");
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(limiter.tracked_identities(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_allow_never_over_admits() {
        let limiter = Arc::new(limiter(50, 60_000));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { (0..20).filter(|_| limiter.allow("shared")).count() })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            admitted += handle.await.unwrap();
        }
        assert_eq!(admitted, 50);
    }

    #[tokio::test]
    async fn test_registry_presets() {
        let collector = Arc::new(MetricsCollector::new());
        let registry = RateLimiterRegistry::new().with_metrics(Arc::clone(&collector));
        registry.register_presets(default_presets());

        assert_eq!(registry.names(), vec!["api", "public_api", "sdk"]);
        let sdk = registry.get("sdk").unwrap();
        assert_eq!(sdk.config().limit, 10);
        for _ in 0..10 {
            assert!(sdk.allow("client-1"));
        }
        assert!(!sdk.allow("client-1"));

        let remaining = registry.remaining("client-1");
        assert_eq!(remaining.get("sdk"), Some(&0));
        assert_eq!(remaining.get("api"), Some(&100));

        let rejected = collector.counter(
            metric_names::RATE_LIMITER_REQUESTS_TOTAL,
            &[("limiter", "sdk"), ("outcome", "rejected")],
        );
        assert_eq!(rejected.get(), 1.0);
        registry.shutdown();
    }
}
