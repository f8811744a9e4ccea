//! # Retry With Exponential Backoff
//!
//! Stateless helper that re-runs a fallible async operation. Waits start at
//! `initial_interval`, grow by `multiplier` per attempt up to `max_interval`, and are
//! spread by a multiplicative jitter of ±`random_factor`. Cancellation is observed
//! before every wait and raced against the timer during it; a cancelled retry is
//! reported as [`RetryError::Cancelled`], never as the operation's own error.

use crate::constants::defaults;
use crate::error::{Classify, ErrorKind};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Backoff policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
    /// Jitter amplitude in `[0, 1]`
    pub random_factor: f64,
    /// Kinds worth retrying; empty retries everything
    pub retryable_errors: Vec<ErrorKind>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: defaults::RETRY_MAX_RETRIES,
            initial_interval: defaults::RETRY_INITIAL_INTERVAL,
            max_interval: defaults::RETRY_MAX_INTERVAL,
            multiplier: defaults::RETRY_MULTIPLIER,
            random_factor: defaults::RETRY_RANDOM_FACTOR,
            retryable_errors: Vec::new(),
        }
    }
}

impl RetryConfig {
    pub fn is_retryable<E: Classify>(&self, error: &E) -> bool {
        self.retryable_errors.is_empty() || self.retryable_errors.contains(&error.error_kind())
    }

    /// Un-jittered waits between attempts
    pub fn schedule(&self) -> BackoffSchedule {
        BackoffSchedule {
            next: self.initial_interval.min(self.max_interval),
            max_interval: self.max_interval,
            multiplier: self.multiplier,
            remaining: self.max_retries,
        }
    }

    /// Spread `interval` by ±`random_factor`, never past `max_interval`
    pub fn jittered(&self, interval: Duration) -> Duration {
        let spread = self.random_factor * (2.0 * fastrand::f64() - 1.0);
        scale(interval, 1.0 + spread, self.max_interval)
    }
}

fn scale(interval: Duration, factor: f64, max: Duration) -> Duration {
    Duration::try_from_secs_f64(interval.as_secs_f64() * factor.max(0.0))
        .unwrap_or(max)
        .min(max)
}

/// Iterator over the base backoff intervals, one per permitted retry
#[derive(Debug, Clone)]
pub struct BackoffSchedule {
    next: Duration,
    max_interval: Duration,
    multiplier: f64,
    remaining: u32,
}

impl Iterator for BackoffSchedule {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let current = self.next;
        self.next = scale(current, self.multiplier, self.max_interval);
        Some(current)
    }
}

/// Failure of a retried operation
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// The operation's final error, returned unchanged
    #[error("{0}")]
    Operation(E),

    /// Cancellation was observed before the retries were exhausted
    #[error("Retry of {operation} cancelled after {attempts} attempt(s)")]
    Cancelled {
        operation: String,
        attempts: u32,
        last_error: Option<E>,
    },
}

impl<E> RetryError<E> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled { .. })
    }

    /// The operation's error, if one was observed
    pub fn into_inner(self) -> Option<E> {
        match self {
            RetryError::Operation(error) => Some(error),
            RetryError::Cancelled { last_error, .. } => last_error,
        }
    }
}

/// Run `f` until it succeeds, fails with a non-retryable error, exhausts
/// `config.max_retries`, or `cancel` fires.
pub async fn retry_with_backoff<F, Fut, T, E>(
    cancel: &CancellationToken,
    operation: &str,
    f: F,
    config: &RetryConfig,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Classify + Display,
{
    retry_with_backoff_if(cancel, operation, f, config, |error: &E| {
        config.is_retryable(error)
    })
    .await
}

/// Like [`retry_with_backoff`] with caller-supplied classification
pub async fn retry_with_backoff_if<F, Fut, T, E, P>(
    cancel: &CancellationToken,
    operation: &str,
    mut f: F,
    config: &RetryConfig,
    should_retry: P,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    P: Fn(&E) -> bool,
{
    let mut schedule = config.schedule();
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        let error = match f().await {
            Ok(value) => {
                if attempts > 1 {
                    info!(operation = %operation, attempts = attempts, "✅ Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        if !should_retry(&error) {
            debug!(operation = %operation, error = %error, "Error is not retryable");
            return Err(RetryError::Operation(error));
        }

        let Some(interval) = schedule.next() else {
            warn!(
                operation = %operation,
                attempts = attempts,
                error = %error,
                "❌ Retries exhausted"
            );
            return Err(RetryError::Operation(error));
        };

        if cancel.is_cancelled() {
            return Err(cancelled(operation, attempts, error));
        }

        let delay = config.jittered(interval);
        warn!(
            operation = %operation,
            attempt = attempts,
            max_retries = config.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Operation failed, retrying"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled(operation, attempts, error)),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

fn cancelled<E>(operation: &str, attempts: u32, error: E) -> RetryError<E> {
    info!(operation = %operation, attempts = attempts, "Retry cancelled");
    RetryError::Cancelled {
        operation: operation.to_string(),
        attempts,
        last_error: Some(error),
    }
}
