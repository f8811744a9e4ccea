//! # Circuit Breaker Registry
//!
//! Named breakers are created on first use and shared by every caller afterwards.
//! Lookup takes the read lock; construction re-checks under the write lock so two
//! racing callers never build two breakers for the same dependency.

use crate::metrics::MetricsCollector;
use crate::resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, SystemCircuitBreakerMetrics,
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Factory and lookup table for named [`CircuitBreaker`]s
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
    default_config: CircuitBreakerConfig,
    /// Per-component overrides of `default_config`
    component_configs: HashMap<String, CircuitBreakerConfig>,
    collector: Option<Arc<MetricsCollector>>,
}

impl CircuitBreakerRegistry {
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: RwLock::new(HashMap::new()),
            default_config,
            component_configs: HashMap::new(),
            collector: None,
        }
    }

    pub fn with_component_configs(
        mut self,
        component_configs: HashMap<String, CircuitBreakerConfig>,
    ) -> Self {
        self.component_configs = component_configs;
        self
    }

    pub fn with_metrics(mut self, collector: Arc<MetricsCollector>) -> Self {
        self.collector = Some(collector);
        self
    }

    /// Configuration a breaker named `name` is built with
    pub fn config_for(&self, name: &str) -> &CircuitBreakerConfig {
        self.component_configs
            .get(name)
            .unwrap_or(&self.default_config)
    }

    /// Get or create the breaker for `name`
    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        let config = self.config_for(name).clone();
        self.get_with_config(name, config)
    }

    /// Get or create the breaker for `name`; `config` only applies on creation
    pub fn get_with_config(&self, name: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().get(name) {
            return Arc::clone(breaker);
        }

        let mut breakers = self.breakers.write();
        // Another caller may have won the race between the two locks
        if let Some(breaker) = breakers.get(name) {
            return Arc::clone(breaker);
        }

        let mut breaker = CircuitBreaker::new(name, config);
        if let Some(collector) = &self.collector {
            breaker = breaker.with_metrics(Arc::clone(collector));
        }
        let breaker = Arc::new(breaker);
        breakers.insert(name.to_string(), Arc::clone(&breaker));
        debug!(component = %name, total = breakers.len(), "Registered circuit breaker");
        breaker
    }

    /// Current state of every breaker, keyed by name
    pub fn get_status(&self) -> BTreeMap<String, String> {
        self.breakers
            .read()
            .iter()
            .map(|(name, breaker)| (name.clone(), breaker.state().as_str().to_string()))
            .collect()
    }

    pub fn get_metrics(&self) -> BTreeMap<String, CircuitBreakerMetrics> {
        self.breakers
            .read()
            .iter()
            .map(|(name, breaker)| (name.clone(), breaker.metrics()))
            .collect()
    }

    pub fn system_metrics(&self) -> SystemCircuitBreakerMetrics {
        let metrics = self.get_metrics();
        SystemCircuitBreakerMetrics::from_breakers(metrics.values())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.breakers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.read().is_empty()
    }
}
