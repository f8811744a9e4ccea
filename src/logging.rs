//! # Structured Logging Module
//!
//! Environment-aware structured logging for the resilience components, plus the
//! canonical events the composition layer emits for admission decisions and
//! dependency calls.

use chrono::Utc;
use std::sync::OnceLock;
use std::time::Duration;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration.
///
/// `RUST_LOG` takes precedence over the environment's default level. Output is JSON
/// when `RESILIENCE_LOG_FORMAT=json`. Safe to call more than once and when another
/// global subscriber is already installed.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);
        let json = use_json_format();

        let filter = || {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level))
        };

        let layer = if json {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false)
                .json()
                .with_filter(filter())
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_filter(filter())
                .boxed()
        };

        // Use try_init to avoid panic if global subscriber already set
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            environment = %environment,
            json = json,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("RESILIENCE_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
        .to_lowercase()
}

fn use_json_format() -> bool {
    std::env::var("RESILIENCE_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

/// Log the outcome of a rate-limit check
pub fn log_admission_decision(limiter: &str, identity: &str, allowed: bool, remaining: usize) {
    if allowed {
        tracing::debug!(
            limiter = %limiter,
            identity = %identity,
            remaining = remaining,
            "🚦 ADMISSION: allowed"
        );
    } else {
        tracing::warn!(
            limiter = %limiter,
            identity = %identity,
            timestamp = %Utc::now().to_rfc3339(),
            "🚦 ADMISSION: rejected"
        );
    }
}

/// Log the outcome of a protected dependency call
pub fn log_dependency_call(dependency: &str, outcome: &str, duration: Duration, error: Option<&str>) {
    match error {
        None => tracing::debug!(
            dependency = %dependency,
            outcome = %outcome,
            duration_ms = duration.as_millis() as u64,
            "🔗 DEPENDENCY_CALL"
        ),
        Some(error) => tracing::warn!(
            dependency = %dependency,
            outcome = %outcome,
            duration_ms = duration.as_millis() as u64,
            error = %error,
            timestamp = %Utc::now().to_rfc3339(),
            "🔗 DEPENDENCY_CALL failed"
        ),
    }
}
