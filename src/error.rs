//! # Error Types
//!
//! Error taxonomy shared by every resilience component.
//!
//! Admission denials (rate limit exceeded, circuit open) are expected outcomes and
//! carry their own variants so collaborators can tell them apart from genuine
//! dependency failures. Lock, map and counter operations never fail and therefore
//! have no error type at all.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Coarse classification used by retry allow-lists and HTTP status mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RateLimited,
    CircuitOpen,
    Timeout,
    Connection,
    Unavailable,
    Transient,
    Cancelled,
    Internal,
    Other,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Connection => "connection",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::Transient => "transient",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
            ErrorKind::Other => "other",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResilienceError {
    #[error("Rate limit exceeded for {identity}: limit {limit}, retry after {retry_after:?}")]
    RateLimitExceeded {
        identity: String,
        limit: usize,
        retry_after: Duration,
    },
    #[error("Circuit breaker is open for {component}")]
    CircuitOpen { component: String },
    #[error("Timeout error: {0}")]
    Timeout(String),
    #[error("Service {service} unavailable: {message}")]
    Unavailable { service: String, message: String },
    #[error("Operation cancelled: {operation}")]
    Cancelled { operation: String },
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResilienceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResilienceError::RateLimitExceeded { .. } => ErrorKind::RateLimited,
            ResilienceError::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            ResilienceError::Timeout(_) => ErrorKind::Timeout,
            ResilienceError::Unavailable { .. } => ErrorKind::Unavailable,
            ResilienceError::Cancelled { .. } => ErrorKind::Cancelled,
            ResilienceError::Configuration(_) | ResilienceError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// HTTP status a request-facing collaborator should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            ResilienceError::RateLimitExceeded { .. } => 429,
            ResilienceError::CircuitOpen { .. } => 503,
            ResilienceError::Timeout(_) => 504,
            ResilienceError::Unavailable { .. } => 502,
            ResilienceError::Cancelled { .. } => 499,
            ResilienceError::Configuration(_) | ResilienceError::Internal(_) => 500,
        }
    }

    /// True for the expected "not admitted" outcomes
    pub fn is_admission_denied(&self) -> bool {
        matches!(
            self,
            ResilienceError::RateLimitExceeded { .. } | ResilienceError::CircuitOpen { .. }
        )
    }
}

impl From<crate::config::ConfigurationError> for ResilienceError {
    fn from(error: crate::config::ConfigurationError) -> Self {
        ResilienceError::Configuration(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ResilienceError>;

/// Maps an error value onto an [`ErrorKind`]
pub trait Classify {
    fn error_kind(&self) -> ErrorKind;
}

impl Classify for ResilienceError {
    fn error_kind(&self) -> ErrorKind {
        self.kind()
    }
}

impl Classify for std::io::Error {
    fn error_kind(&self) -> ErrorKind {
        use std::io::ErrorKind as Io;
        match self.kind() {
            Io::TimedOut => ErrorKind::Timeout,
            Io::ConnectionRefused
            | Io::ConnectionReset
            | Io::ConnectionAborted
            | Io::NotConnected
            | Io::BrokenPipe => ErrorKind::Connection,
            Io::WouldBlock | Io::Interrupted => ErrorKind::Transient,
            _ => ErrorKind::Other,
        }
    }
}

impl Classify for anyhow::Error {
    fn error_kind(&self) -> ErrorKind {
        if let Some(error) = self.downcast_ref::<ResilienceError>() {
            return error.kind();
        }
        if let Some(error) = self.downcast_ref::<std::io::Error>() {
            return error.error_kind();
        }
        ErrorKind::Other
    }
}

impl Classify for String {
    fn error_kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

impl Classify for &'static str {
    fn error_kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admission_denials_are_distinct() {
        let limited = ResilienceError::RateLimitExceeded {
            identity: "10.0.0.1".to_string(),
            limit: 10,
            retry_after: Duration::from_secs(60),
        };
        let open = ResilienceError::CircuitOpen {
            component: "postman_api".to_string(),
        };
        let internal = ResilienceError::Internal("boom".to_string());

        assert!(limited.is_admission_denied());
        assert!(open.is_admission_denied());
        assert!(!internal.is_admission_denied());

        assert_eq!(limited.status_code(), 429);
        assert_eq!(open.status_code(), 503);
        assert_eq!(internal.status_code(), 500);
    }

    #[test]
    fn test_io_errors_are_classified() {
        let timeout = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow");
        let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "down");
        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");

        assert_eq!(timeout.error_kind(), ErrorKind::Timeout);
        assert_eq!(refused.error_kind(), ErrorKind::Connection);
        assert_eq!(missing.error_kind(), ErrorKind::Other);
    }

    #[test]
    fn test_anyhow_downcasts_to_known_errors() {
        let wrapped = anyhow::Error::new(ResilienceError::Timeout("db".to_string()));
        assert_eq!(wrapped.error_kind(), ErrorKind::Timeout);

        let plain = anyhow::anyhow!("something else");
        assert_eq!(plain.error_kind(), ErrorKind::Other);
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::RateLimited).unwrap();
        assert_eq!(json, "\"rate_limited\"");
        assert_eq!(ErrorKind::CircuitOpen.to_string(), "circuit_open");
    }
}
