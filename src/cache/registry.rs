//! Named cache instances created on first use.

use super::{Cache, CacheConfig, CacheStats};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Lookup-or-create table of [`Cache`]s sharing one configuration
#[derive(Debug)]
pub struct CacheRegistry<V> {
    caches: RwLock<HashMap<String, Arc<Cache<V>>>>,
    config: CacheConfig,
    /// Parent of every cache's sweep token
    shutdown: CancellationToken,
}

impl<V> CacheRegistry<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(config: CacheConfig) -> Self {
        Self {
            caches: RwLock::new(HashMap::new()),
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Get or create the cache called `name`
    pub fn get(&self, name: &str) -> Arc<Cache<V>> {
        if let Some(cache) = self.caches.read().get(name) {
            return Arc::clone(cache);
        }

        let mut caches = self.caches.write();
        if let Some(cache) = caches.get(name) {
            return Arc::clone(cache);
        }

        let cache = Cache::new(name, self.config.clone())
            .with_shutdown_token(&self.shutdown)
            .start();
        caches.insert(name.to_string(), Arc::clone(&cache));
        debug!(cache = %name, total = caches.len(), "Registered cache");
        cache
    }

    /// Hit, miss and eviction counts per cache
    pub fn get_metrics(&self) -> BTreeMap<String, CacheStats> {
        self.caches
            .read()
            .iter()
            .map(|(name, cache)| (name.clone(), cache.metrics()))
            .collect()
    }

    /// Empty every cache; counters are kept
    pub fn clear_all(&self) {
        for cache in self.caches.read().values() {
            cache.clear();
        }
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Stop every sweep task
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        info!(caches = self.caches.read().len(), "Cache registry shut down");
    }
}

impl<V> Default for CacheRegistry<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
