//! Per-key TTL store with hit, miss and eviction accounting.

use crate::constants::defaults;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Cache tunables
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Period of the background expiry sweep
    pub sweep_interval: Duration,
    /// TTL used by [`Cache::set_default`]
    pub default_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sweep_interval: defaults::CACHE_SWEEP_INTERVAL,
            default_ttl: defaults::CACHE_DEFAULT_TTL,
        }
    }
}

/// Counters reported by [`Cache::metrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries removed by the expiry sweep
    pub evictions: u64,
    /// Entries currently stored, expired or not
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

/// Stand-in expiry for TTLs too long to represent, roughly 30 years out
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

fn expiry_after(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Named TTL cache
#[derive(Debug)]
pub struct Cache<V> {
    name: String,
    config: CacheConfig,
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    shutdown: CancellationToken,
}

impl<V> Cache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, config: CacheConfig) -> Self {
        Self {
            name: name.into(),
            config,
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        }
    }

    /// Stop the sweep when `token` is cancelled
    pub fn with_shutdown_token(mut self, token: &CancellationToken) -> Self {
        self.shutdown = token.child_token();
        self
    }

    /// Share the cache and spawn its expiry sweep
    pub fn start(self) -> Arc<Self> {
        let cache = Arc::new(self);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(Self::sweep_loop(
                    Arc::downgrade(&cache),
                    cache.config.sweep_interval,
                    cache.shutdown.clone(),
                ));
            }
            Err(_) => {
                warn!(cache = %cache.name, "No tokio runtime available; cache sweep disabled");
            }
        }
        cache
    }

    async fn sweep_loop(cache: Weak<Self>, period: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let Some(cache) = cache.upgrade() else { break };
                    cache.purge_expired();
                }
            }
        }
        debug!("Cache sweep task stopped");
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store `value` under `key` for `ttl`, replacing any previous entry
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let entry = CacheEntry {
            value,
            expires_at: expiry_after(Instant::now(), ttl),
        };
        self.entries.write().insert(key.into(), entry);
    }

    pub fn set_default(&self, key: impl Into<String>, value: V) {
        self.set(key, value, self.config.default_ttl);
    }

    /// Unexpired value for `key`; expired entries count as misses
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let value = self
            .entries
            .read()
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone());

        match value {
            Some(_) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(cache = %self.name, key = %key, "Cache hit");
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(cache = %self.name, key = %key, "Cache miss");
            }
        }
        value
    }

    /// Cached value for `key`, or the result of `f` stored for `ttl`
    pub fn get_or_insert_with<F>(&self, key: &str, ttl: Duration, f: F) -> V
    where
        F: FnOnce() -> V,
    {
        if let Some(value) = self.get(key) {
            return value;
        }
        let value = f();
        self.set(key, value.clone(), ttl);
        value
    }

    /// Async variant of [`Cache::get_or_insert_with`]; errors are not cached
    pub async fn get_or_try_insert_with<F, Fut, E>(
        &self,
        key: &str,
        ttl: Duration,
        f: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let value = f().await?;
        self.set(key, value.clone(), ttl);
        Ok(value)
    }

    pub fn delete(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    pub fn clear(&self) {
        let removed = {
            let mut entries = self.entries.write();
            let removed = entries.len();
            entries.clear();
            removed
        };
        info!(cache = %self.name, removed = removed, "Cache cleared");
    }

    /// Stored entries, including expired ones not yet swept
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Remove every expired entry; returns how many were evicted
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let evicted = {
            let mut entries = self.entries.write();
            let before = entries.len();
            entries.retain(|_, entry| !entry.is_expired(now));
            before - entries.len()
        };

        if evicted > 0 {
            self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
            debug!(cache = %self.name, evicted = evicted, "🧹 Evicted expired cache entries");
        }
        evicted
    }

    pub fn metrics(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    pub fn hit_rate(&self) -> f64 {
        self.metrics().hit_rate()
    }

    /// Stop the background sweep
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl<V> Drop for Cache<V> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
