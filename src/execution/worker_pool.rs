//! # Worker Pool
//!
//! Fixed number of tokio workers pulling [`Task`]s from a bounded queue.
//!
//! ## Lifecycle
//!
//! - `submit` waits while the queue is full and refuses work once `stop` has begun
//! - `start` spawns `worker_count` workers; calling it again is a no-op
//! - `stop` cancels the shared token, closes the queue and waits until every accepted
//!   task has run. Tasks still queued when `stop` is called are drained, not dropped.
//!
//! A task that returns an error or panics is logged and counted as failed; the worker
//! moves on to the next task.

use super::Task;
use crate::constants::{defaults, metric_names};
use crate::error::{ResilienceError, Result};
use crate::metrics::MetricsCollector;
use futures::FutureExt;
use parking_lot::Mutex;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type BoxedTask = Box<dyn Task>;

/// Pool sizing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPoolConfig {
    pub worker_count: usize,
    pub queue_capacity: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            worker_count: defaults::WORKER_COUNT,
            queue_capacity: defaults::WORKER_QUEUE_CAPACITY,
        }
    }
}

/// State shared between the pool handle and its workers
struct Shared {
    receiver: tokio::sync::Mutex<mpsc::Receiver<BoxedTask>>,
    /// Tasks submitted and not yet picked up, including submitters waiting for room
    queued: AtomicUsize,
    active_workers: AtomicUsize,
    collector: Arc<MetricsCollector>,
    cancel: CancellationToken,
}

/// Bounded-concurrency task executor
pub struct WorkerPool {
    config: WorkerPoolConfig,
    sender: Mutex<Option<mpsc::Sender<BoxedTask>>>,
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.config)
            .field("queue_size", &self.queue_size())
            .field("running", &self.is_running())
            .finish()
    }
}

impl WorkerPool {
    pub fn new(config: WorkerPoolConfig) -> Self {
        Self::with_metrics(config, Arc::new(MetricsCollector::new()))
    }

    /// Pool reporting into a shared collector
    pub fn with_metrics(config: WorkerPoolConfig, collector: Arc<MetricsCollector>) -> Self {
        // A zero-capacity channel would panic; validation rejects it upstream
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));

        Self {
            config,
            sender: Mutex::new(Some(sender)),
            shared: Arc::new(Shared {
                receiver: tokio::sync::Mutex::new(receiver),
                queued: AtomicUsize::new(0),
                active_workers: AtomicUsize::new(0),
                collector,
                cancel: CancellationToken::new(),
            }),
            workers: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        }
    }

    /// Enqueue a task, waiting while the queue is full.
    ///
    /// Returns `false` only once shutdown has begun; the task is then dropped
    /// without running.
    pub async fn submit<T>(&self, task: T) -> bool
    where
        T: Task + 'static,
    {
        self.submit_boxed(Box::new(task)).await
    }

    pub async fn submit_boxed(&self, task: BoxedTask) -> bool {
        if self.shared.cancel.is_cancelled() {
            return false;
        }
        let Some(sender) = self.sender.lock().clone() else {
            return false;
        };

        let name = task.name().to_string();
        self.shared.queued.fetch_add(1, Ordering::SeqCst);

        let accepted = tokio::select! {
            biased;
            _ = self.shared.cancel.cancelled() => false,
            sent = sender.send(task) => sent.is_ok(),
        };

        if !accepted {
            self.shared.queued.fetch_sub(1, Ordering::SeqCst);
            debug!(task_name = %name, "Task refused, worker pool is shutting down");
            return false;
        }

        self.shared
            .collector
            .counter(metric_names::WORKER_POOL_TASKS_SUBMITTED, &[])
            .inc();
        self.shared.update_queue_gauge();
        true
    }

    /// Spawn the workers on the current tokio runtime
    pub fn start(&self) -> Result<()> {
        if self.shared.cancel.is_cancelled() {
            return Err(ResilienceError::Internal(
                "worker pool has already been stopped".to_string(),
            ));
        }
        let handle = tokio::runtime::Handle::try_current().map_err(|e| {
            ResilienceError::Internal(format!("worker pool requires a tokio runtime: {e}"))
        })?;

        if self.started.swap(true, Ordering::SeqCst) {
            debug!("Worker pool already started");
            return Ok(());
        }

        let mut workers = self.workers.lock();
        for worker_id in 0..self.config.worker_count {
            workers.push(handle.spawn(Self::run_worker(worker_id, Arc::clone(&self.shared))));
        }

        info!(
            worker_count = self.config.worker_count,
            queue_capacity = self.config.queue_capacity,
            "🚀 Worker pool started"
        );
        Ok(())
    }

    async fn run_worker(worker_id: usize, shared: Arc<Shared>) {
        shared.worker_started();
        debug!(worker_id = worker_id, "Worker started");

        loop {
            // Drain until every sender is gone and the queue is empty
            let next = { shared.receiver.lock().await.recv().await };
            match next {
                Some(task) => shared.process_task(task).await,
                None => break,
            }
        }

        shared.worker_stopped();
        debug!(worker_id = worker_id, "Worker stopped");
    }

    /// Refuse new work and wait until every accepted task has run
    pub async fn stop(&self) {
        info!(queued = self.queue_size(), "🛑 Stopping worker pool");
        self.shared.cancel.cancel();
        // Dropping the pool's sender closes the queue once blocked submitters bail out
        drop(self.sender.lock().take());

        let handles = std::mem::take(&mut *self.workers.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task terminated abnormally");
            }
        }

        // Never started, or every worker died: run what is left here
        let mut receiver = self.shared.receiver.lock().await;
        receiver.close();
        let mut drained = 0usize;
        while let Some(task) = receiver.recv().await {
            self.shared.process_task(task).await;
            drained += 1;
        }
        if drained > 0 {
            warn!(drained = drained, "Ran queued tasks during shutdown without workers");
        }

        info!("Worker pool stopped");
    }

    /// Pending tasks, including submitters waiting for room
    pub fn queue_size(&self) -> usize {
        self.shared.queued.load(Ordering::SeqCst)
    }

    pub fn queue_capacity(&self) -> usize {
        self.config.queue_capacity
    }

    pub fn worker_count(&self) -> usize {
        self.config.worker_count
    }

    pub fn active_workers(&self) -> usize {
        self.shared.active_workers.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.shared.cancel.is_cancelled()
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.shared.collector
    }
}

impl Shared {
    async fn process_task(&self, task: BoxedTask) {
        self.queued.fetch_sub(1, Ordering::SeqCst);
        self.update_queue_gauge();

        let task_name = task.name().to_string();
        let labels = [("task_name", task_name.as_str())];
        let timer = self
            .collector
            .histogram(metric_names::WORKER_POOL_TASK_DURATION_MS, &labels)
            .timer();

        let outcome = AssertUnwindSafe(task.execute(self.cancel.clone()))
            .catch_unwind()
            .await;
        let duration = timer.stop();

        match outcome {
            Ok(Ok(())) => {
                self.collector
                    .counter(metric_names::WORKER_POOL_TASKS_COMPLETED, &labels)
                    .inc();
                debug!(
                    task_id = %task.id(),
                    task_name = %task_name,
                    duration_ms = duration.as_millis() as u64,
                    "✅ Task completed"
                );
            }
            Ok(Err(e)) => {
                self.collector
                    .counter(metric_names::WORKER_POOL_TASKS_FAILED, &labels)
                    .inc();
                error!(
                    task_id = %task.id(),
                    task_name = %task_name,
                    duration_ms = duration.as_millis() as u64,
                    error = %e,
                    "❌ Task failed"
                );
            }
            Err(panic) => {
                self.collector
                    .counter(metric_names::WORKER_POOL_TASKS_FAILED, &labels)
                    .inc();
                error!(
                    task_id = %task.id(),
                    task_name = %task_name,
                    panic = %panic_message(panic.as_ref()),
                    "💥 Task panicked"
                );
            }
        }
    }

    fn update_queue_gauge(&self) {
        self.collector
            .gauge(metric_names::WORKER_POOL_QUEUE_SIZE, &[])
            .set(self.queued.load(Ordering::SeqCst) as f64);
    }

    fn worker_started(&self) {
        let active = self.active_workers.fetch_add(1, Ordering::SeqCst) + 1;
        self.collector
            .gauge(metric_names::WORKER_POOL_ACTIVE_WORKERS, &[])
            .set(active as f64);
    }

    fn worker_stopped(&self) {
        let active = self.active_workers.fetch_sub(1, Ordering::SeqCst) - 1;
        self.collector
            .gauge(metric_names::WORKER_POOL_ACTIVE_WORKERS, &[])
            .set(active as f64);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
