//! # Task Execution
//!
//! Bounded-concurrency execution of long-running work that should not run inline
//! with a request.
//!
//! Work is expressed as a [`Task`]; ad hoc closures are wrapped in [`FnTask`].
//! The [`WorkerPool`] queues tasks in a bounded channel, applies backpressure to
//! submitters when the queue is full and isolates failures so one task cannot stop
//! the pool or its siblings.

pub mod task;
pub mod worker_pool;

pub use task::{FnTask, Task};
pub use worker_pool::{WorkerPool, WorkerPoolConfig};
