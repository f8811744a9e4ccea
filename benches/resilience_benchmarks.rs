//! Hot-path benchmarks
//!
//! Everything here sits on the request path: admission, breaker checks, cache
//! lookups and labelled counter increments.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use resilience_core::cache::{Cache, CacheConfig};
use resilience_core::metrics::MetricsCollector;
use resilience_core::resilience::{
    CircuitBreaker, CircuitBreakerConfig, RateLimiter, RateLimiterConfig,
};
use std::time::Duration;

fn benchmark_rate_limiter(c: &mut Criterion) {
    // Saturates after the first 100 calls, so this measures the deny path
    let limiter = RateLimiter::new("bench", RateLimiterConfig::new(100, Duration::from_secs(60)));
    c.bench_function("rate_limiter_allow_saturated", |b| {
        b.iter(|| limiter.allow(black_box("10.0.0.1")))
    });

    let identities: Vec<String> = (0..1_000).map(|i| format!("10.0.{}.{}", i / 256, i % 256)).collect();
    let limiter = RateLimiter::new("bench", RateLimiterConfig::new(100, Duration::from_secs(60)));
    let mut next = 0;
    c.bench_function("rate_limiter_allow_many_identities", |b| {
        b.iter(|| {
            next = (next + 1) % identities.len();
            limiter.allow(black_box(&identities[next]))
        })
    });
}

fn benchmark_circuit_breaker(c: &mut Criterion) {
    let breaker = CircuitBreaker::new("bench", CircuitBreakerConfig::default());
    c.bench_function("circuit_breaker_allow_and_record", |b| {
        b.iter(|| {
            if breaker.allow_request() {
                breaker.record_success();
            }
        })
    });
}

fn benchmark_cache(c: &mut Criterion) {
    let cache: Cache<String> = Cache::new("bench", CacheConfig::default());
    for i in 0..1_000 {
        cache.set(format!("key-{i}"), format!("value-{i}"), Duration::from_secs(300));
    }

    c.bench_function("cache_get_hit", |b| b.iter(|| cache.get(black_box("key-500"))));
    c.bench_function("cache_get_miss", |b| b.iter(|| cache.get(black_box("absent"))));
    c.bench_function("cache_set", |b| {
        b.iter(|| cache.set("hot", black_box("payload".to_string()), Duration::from_secs(300)))
    });
}

fn benchmark_labelled_counters(c: &mut Criterion) {
    let collector = MetricsCollector::new();
    let mut group = c.benchmark_group("counter_inc");
    for label_count in [0usize, 2, 4] {
        let labels: Vec<(String, String)> = (0..label_count)
            .map(|i| (format!("label_{i}"), format!("value_{i}")))
            .collect();
        let labels: Vec<(&str, &str)> = labels.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();

        group.bench_with_input(BenchmarkId::from_parameter(label_count), &labels, |b, labels| {
            b.iter(|| collector.counter("http_requests_total", labels).inc())
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    benchmark_rate_limiter,
    benchmark_circuit_breaker,
    benchmark_cache,
    benchmark_labelled_counters
);
criterion_main!(benches);
