//! End-to-end behavior of each component under controlled time.

mod common;

use common::*;
use resilience_core::cache::{Cache, CacheConfig};
use resilience_core::execution::{FnTask, WorkerPool, WorkerPoolConfig};
use resilience_core::resilience::{retry_with_backoff, CircuitState, RetryConfig, RetryError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn rate_limiter_admits_three_then_recovers_after_window() {
    init_test_logging();
    let limiter = rate_limiter(3, Duration::from_secs(1));

    assert!(limiter.allow("a"));
    assert!(limiter.allow("a"));
    assert!(limiter.allow("a"));
    assert!(!limiter.allow("a"));
    assert_eq!(limiter.remaining("a"), 0);

    tokio::time::advance(Duration::from_millis(1100)).await;
    assert!(limiter.allow("a"));
    assert_eq!(limiter.remaining("a"), 2);
}

#[tokio::test(start_paused = true)]
async fn circuit_breaker_opens_probes_and_closes() {
    init_test_logging();
    let breaker = circuit_breaker(2, 1, Duration::from_millis(50));

    breaker.record_failure();
    breaker.record_failure();
    assert_eq!(breaker.state(), CircuitState::Open);
    assert!(!breaker.allow_request());

    tokio::time::advance(Duration::from_millis(60)).await;
    assert!(breaker.allow_request());
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    breaker.record_success();
    assert_eq!(breaker.state(), CircuitState::Closed);

    let metrics = breaker.metrics();
    assert_eq!(metrics.failure_count, 2);
    assert_eq!(metrics.rejected_calls, 1);
}

#[tokio::test(start_paused = true)]
async fn cache_entry_expires_lazily() {
    init_test_logging();
    let cache: Cache<String> = Cache::new("scenario", CacheConfig::default());
    cache.set("k", "v".to_string(), Duration::from_millis(20));

    tokio::time::advance(Duration::from_millis(5)).await;
    assert_eq!(cache.get("k").as_deref(), Some("v"));

    tokio::time::advance(Duration::from_millis(20)).await;
    assert_eq!(cache.get("k"), None);

    assert_eq!(cache.purge_expired(), 1);
    let stats = cache.metrics();
    assert_eq!((stats.hits, stats.misses, stats.evictions), (1, 1, 1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn worker_pool_runs_every_accepted_task_exactly_once() {
    init_test_logging();
    let pool = Arc::new(WorkerPool::new(WorkerPoolConfig {
        worker_count: 4,
        queue_capacity: 8,
    }));
    pool.start().unwrap();

    let runs: Arc<parking_lot::Mutex<HashMap<u32, u32>>> = Arc::default();
    let submitters: Vec<_> = (0..4u32)
        .map(|submitter| {
            let pool = Arc::clone(&pool);
            let runs = Arc::clone(&runs);
            tokio::spawn(async move {
                for i in 0..50u32 {
                    let key = submitter * 1000 + i;
                    let runs = Arc::clone(&runs);
                    let task = FnTask::new("record", move |_cancel| {
                        let runs = Arc::clone(&runs);
                        async move {
                            *runs.lock().entry(key).or_insert(0) += 1;
                            Ok(())
                        }
                    });
                    assert!(pool.submit(task).await);
                }
            })
        })
        .collect();

    for submitter in submitters {
        submitter.await.unwrap();
    }
    pool.stop().await;

    let runs = runs.lock();
    assert_eq!(runs.len(), 200);
    assert!(runs.values().all(|count| *count == 1));
}

#[tokio::test]
async fn worker_pool_failure_does_not_stop_siblings() {
    let pool = WorkerPool::new(WorkerPoolConfig {
        worker_count: 1,
        queue_capacity: 4,
    });
    pool.start().unwrap();

    let counter = Arc::new(AtomicU32::new(0));
    pool.submit(FnTask::new("broken", |_cancel| async {
        Err::<(), _>(anyhow::anyhow!("generator crashed"))
    }))
    .await;
    pool.submit(counting_task("healthy", &counter)).await;
    pool.submit(counting_task("healthy", &counter)).await;
    pool.stop().await;

    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn retry_invokes_max_retries_plus_one_and_returns_last_error() {
    let calls = AtomicU32::new(0);
    let cancel = CancellationToken::new();
    let config = RetryConfig {
        max_retries: 4,
        initial_interval: Duration::from_millis(5),
        max_interval: Duration::from_millis(40),
        ..RetryConfig::default()
    };

    let result: Result<(), RetryError<String>> = retry_with_backoff(
        &cancel,
        "always_failing",
        || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Err(format!("attempt {attempt}")) }
        },
        &config,
    )
    .await;

    assert_eq!(calls.load(Ordering::SeqCst), 5);
    match result {
        Err(RetryError::Operation(message)) => assert_eq!(message, "attempt 5"),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn retry_reports_cancellation_not_operation_error() {
    let cancel = CancellationToken::new();
    let config = RetryConfig {
        max_retries: 10,
        initial_interval: Duration::from_secs(5),
        max_interval: Duration::from_secs(5),
        ..RetryConfig::default()
    };

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let result: Result<(), RetryError<String>> = retry_with_backoff(
        &cancel,
        "cancelled",
        || async { Err("still failing".to_string()) },
        &config,
    )
    .await;

    let error = result.unwrap_err();
    assert!(error.is_cancelled());
    assert!(error.to_string().contains("cancelled"));
}
