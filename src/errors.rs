//! Shared error taxonomy and classification.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Closed set of dependency error tags.
///
/// Classification (retryable, qualifying-for-the-breaker) operates on these
/// tags, not on error strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Call exceeded its deadline.
    Timeout,
    /// Dependency reported itself unavailable (connection refused, 503).
    Unavailable,
    /// Dependency shed load (429).
    RateLimited,
    /// Transport-level failure (reset, DNS, broken pipe).
    Network,
    /// Dependency answered with something unparseable.
    Protocol,
    /// The request itself was rejected as malformed.
    InvalidInput,
    /// Everything else.
    Internal,
}

/// Error produced by a single attempt against a dependency.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{kind:?}: {message}")]
pub struct DependencyError {
    pub kind: ErrorKind,
    pub message: String,
}

impl DependencyError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Attempt deadline expired.
    pub fn timeout(ms: u64) -> Self {
        Self::new(ErrorKind::Timeout, format!("call exceeded {}ms deadline", ms))
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }
}

/// Terminal errors surfaced by the executor.
///
/// Transient failures are absorbed by the retry/failover machinery and only
/// appear here wrapped in an exhaustion variant, together with enough context
/// (dependency, endpoint, attempts) for external logging.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Circuit is open; the call was never attempted.
    #[error("circuit open for dependency '{dependency}'")]
    CircuitOpen { dependency: String },

    /// No endpoint table is configured under this name.
    #[error("unknown dependency '{dependency}'")]
    UnknownDependency { dependency: String },

    /// Every retry attempt against the endpoint failed.
    #[error("retries exhausted for '{dependency}' (endpoint {endpoint}, {attempts} attempts): {source}")]
    RetryExhausted {
        dependency: String,
        endpoint: String,
        attempts: u32,
        source: DependencyError,
    },

    /// Every configured endpoint was tried and failed.
    #[error("all endpoints exhausted for '{dependency}' ({attempts} attempts): {source}")]
    FailoverExhausted {
        dependency: String,
        attempts: u32,
        source: DependencyError,
    },

    /// The overall operation deadline elapsed before an attempt succeeded.
    #[error("operation deadline exceeded for '{dependency}' after {elapsed_ms}ms")]
    DeadlineExceeded {
        dependency: String,
        elapsed_ms: u64,
    },

    /// The dependency returned a non-retryable error; surfaced as-is.
    #[error("terminal error from '{dependency}' (endpoint {endpoint}, {attempts} attempts): {source}")]
    Terminal {
        dependency: String,
        endpoint: String,
        attempts: u32,
        source: DependencyError,
    },
}

impl ExecutionError {
    /// The last underlying dependency error, when one exists.
    pub fn last_error(&self) -> Option<&DependencyError> {
        match self {
            ExecutionError::RetryExhausted { source, .. }
            | ExecutionError::FailoverExhausted { source, .. }
            | ExecutionError::Terminal { source, .. } => Some(source),
            ExecutionError::CircuitOpen { .. }
            | ExecutionError::UnknownDependency { .. }
            | ExecutionError::DeadlineExceeded { .. } => None,
        }
    }
}

/// Flatten a terminal executor error into the per-attempt shape.
///
/// Coalesced cache computations share one error across all waiters; this
/// conversion carries the kind and full context string into that shape.
impl From<&ExecutionError> for DependencyError {
    fn from(err: &ExecutionError) -> Self {
        let kind = match err {
            ExecutionError::CircuitOpen { .. } => ErrorKind::Unavailable,
            ExecutionError::UnknownDependency { .. } => ErrorKind::InvalidInput,
            ExecutionError::DeadlineExceeded { .. } => ErrorKind::Timeout,
            _ => err.last_error().map(|e| e.kind).unwrap_or(ErrorKind::Internal),
        };
        DependencyError::new(kind, err.to_string())
    }
}

/// Result type for executor operations.
pub type ExecutionResult<T> = Result<T, ExecutionError>;

/// Decides how a [`DependencyError`] is treated by retry and breaker logic.
pub trait ErrorClassifier: Send + Sync {
    /// May the attempt be repeated?
    fn retryable(&self, err: &DependencyError) -> bool;

    /// Does the failure count toward opening the circuit?
    fn qualifying(&self, err: &DependencyError) -> bool;
}

/// Tag-set classifier.
#[derive(Debug, Clone)]
pub struct KindClassifier {
    retryable: HashSet<ErrorKind>,
    qualifying: HashSet<ErrorKind>,
}

impl KindClassifier {
    pub fn new(retryable: HashSet<ErrorKind>, qualifying: HashSet<ErrorKind>) -> Self {
        Self {
            retryable,
            qualifying,
        }
    }
}

impl Default for KindClassifier {
    fn default() -> Self {
        // Input-validation failures are the caller's problem; retrying or
        // tripping the breaker on them would mask the bug.
        let retryable = HashSet::from([
            ErrorKind::Timeout,
            ErrorKind::Unavailable,
            ErrorKind::RateLimited,
            ErrorKind::Network,
        ]);
        let mut qualifying = retryable.clone();
        qualifying.insert(ErrorKind::Protocol);
        Self {
            retryable,
            qualifying,
        }
    }
}

impl ErrorClassifier for KindClassifier {
    fn retryable(&self, err: &DependencyError) -> bool {
        self.retryable.contains(&err.kind)
    }

    fn qualifying(&self, err: &DependencyError) -> bool {
        self.qualifying.contains(&err.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DependencyError::timeout(250);
        assert_eq!(err.to_string(), "Timeout: call exceeded 250ms deadline");

        let err = ExecutionError::CircuitOpen {
            dependency: "inference".to_string(),
        };
        assert!(err.to_string().contains("inference"));
    }

    #[test]
    fn test_default_classifier() {
        let classifier = KindClassifier::default();

        let timeout = DependencyError::timeout(100);
        assert!(classifier.retryable(&timeout));
        assert!(classifier.qualifying(&timeout));

        let bad_input = DependencyError::new(ErrorKind::InvalidInput, "missing field");
        assert!(!classifier.retryable(&bad_input));
        assert!(!classifier.qualifying(&bad_input));

        // Protocol errors trip the breaker but are not worth retrying
        let protocol = DependencyError::new(ErrorKind::Protocol, "truncated frame");
        assert!(!classifier.retryable(&protocol));
        assert!(classifier.qualifying(&protocol));
    }

    #[test]
    fn test_last_error_context() {
        let err = ExecutionError::RetryExhausted {
            dependency: "quotes".to_string(),
            endpoint: "quotes-primary".to_string(),
            attempts: 3,
            source: DependencyError::unavailable("connection refused"),
        };
        assert_eq!(err.last_error().unwrap().kind, ErrorKind::Unavailable);
        assert!(err.to_string().contains("quotes-primary"));
    }
}
