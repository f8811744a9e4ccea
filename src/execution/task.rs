//! Units of work accepted by the [`WorkerPool`](super::WorkerPool).

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Work the pool can run.
///
/// `execute` receives the pool's cancellation token. A task is never preempted;
/// long-running tasks should check the token at their own checkpoints.
#[async_trait]
pub trait Task: Send + Sync {
    async fn execute(&self, cancel: CancellationToken) -> anyhow::Result<()>;

    fn id(&self) -> &str;

    /// Label used for per-task-name metrics
    fn name(&self) -> &str;
}

type TaskFn = Box<dyn Fn(CancellationToken) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Closure adapter for ad hoc work
pub struct FnTask {
    id: String,
    name: String,
    f: TaskFn,
}

impl FnTask {
    pub fn new<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            f: Box::new(move |cancel| Box::pin(f(cancel))),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

impl fmt::Debug for FnTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTask")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Task for FnTask {
    async fn execute(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        (self.f)(cancel).await
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}
