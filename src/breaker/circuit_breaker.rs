//! Per-dependency failure/success state machine.

use crate::config::schema::BreakerConfig;
use crate::errors::{DependencyError, ErrorClassifier};
use crate::observability::metrics;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Breaker operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    fn as_metric(self) -> u8 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }
}

/// Point-in-time view for the observability summary.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub since_last_change_ms: u64,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    half_open_in_flight: u32,
    last_state_change: Instant,
}

/// Named circuit breaker.
///
/// Transitions are linearized behind a mutex held only for O(1) updates and
/// never across an await, so concurrent outcome recording cannot race the
/// state machine into an inconsistent shape.
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    success_threshold: u32,
    reset_timeout: Duration,
    half_open_max_calls: u32,
    classifier: Arc<dyn ErrorClassifier>,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: String, config: &BreakerConfig, classifier: Arc<dyn ErrorClassifier>) -> Self {
        tracing::info!(
            dependency = %name,
            failure_threshold = config.failure_threshold,
            reset_timeout_ms = config.reset_timeout_ms,
            "Circuit breaker created"
        );
        Self {
            name,
            failure_threshold: config.failure_threshold,
            success_threshold: config.success_threshold,
            reset_timeout: Duration::from_millis(config.reset_timeout_ms),
            half_open_max_calls: config.half_open_max_calls,
            classifier,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                half_open_in_flight: 0,
                last_state_change: Instant::now(),
            }),
        }
    }

    /// May a call proceed right now?
    ///
    /// An Open breaker whose reset timeout has elapsed flips to Half-Open here
    /// and admits the caller as the first trial.
    pub fn allow(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                if inner.last_state_change.elapsed() >= self.reset_timeout {
                    self.transition(&mut inner, CircuitState::HalfOpen);
                    inner.half_open_in_flight = 1;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_in_flight < self.half_open_max_calls {
                    inner.half_open_in_flight += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
                inner.success_count += 1;
                if inner.success_count >= self.success_threshold {
                    self.transition(&mut inner, CircuitState::Closed);
                }
            }
            CircuitState::Open => {
                // Late result from a call admitted before the circuit opened.
                tracing::debug!(dependency = %self.name, "Success recorded while circuit open");
            }
        }
    }

    pub fn record_failure(&self, err: &DependencyError) {
        let qualifying = self.classifier.qualifying(err);
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                if qualifying {
                    inner.failure_count += 1;
                    if inner.failure_count >= self.failure_threshold {
                        self.transition(&mut inner, CircuitState::Open);
                    }
                }
            }
            CircuitState::HalfOpen => {
                inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
                if qualifying {
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            since_last_change_ms: inner.last_state_change.elapsed().as_millis() as u64,
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.half_open_in_flight = 0;
        inner.last_state_change = Instant::now();
        metrics::record_breaker_state(&self.name, to.as_metric());

        match to {
            CircuitState::Open => tracing::warn!(
                dependency = %self.name,
                from = ?from,
                reset_timeout_ms = self.reset_timeout.as_millis() as u64,
                "Circuit opened, failing fast"
            ),
            CircuitState::HalfOpen => tracing::info!(
                dependency = %self.name,
                max_trial_calls = self.half_open_max_calls,
                "Circuit half-open, testing recovery"
            ),
            CircuitState::Closed => tracing::info!(
                dependency = %self.name,
                "Circuit closed, dependency recovered"
            ),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ErrorKind, KindClassifier};

    fn breaker(failure_threshold: u32, reset_timeout_ms: u64, success_threshold: u32) -> CircuitBreaker {
        let config = BreakerConfig {
            failure_threshold,
            success_threshold,
            reset_timeout_ms,
            half_open_max_calls: 2,
        };
        CircuitBreaker::new("test".to_string(), &config, Arc::new(KindClassifier::default()))
    }

    fn failure() -> DependencyError {
        DependencyError::unavailable("connection refused")
    }

    #[test]
    fn test_opens_after_threshold() {
        let cb = breaker(3, 60_000, 1);

        cb.record_failure(&failure());
        cb.record_failure(&failure());
        assert!(cb.allow());
        assert_eq!(cb.state(), CircuitState::Closed);

        cb.record_failure(&failure());
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow());
    }

    #[test]
    fn test_success_resets_consecutive_failures() {
        let cb = breaker(3, 60_000, 1);

        cb.record_failure(&failure());
        cb.record_failure(&failure());
        cb.record_success();
        cb.record_failure(&failure());
        cb.record_failure(&failure());
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_non_qualifying_failures_do_not_trip() {
        let cb = breaker(2, 60_000, 1);
        let bad_input = DependencyError::new(ErrorKind::InvalidInput, "missing field");

        cb.record_failure(&bad_input);
        cb.record_failure(&bad_input);
        cb.record_failure(&bad_input);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_after_reset_timeout() {
        let cb = breaker(1, 50, 1);

        cb.record_failure(&failure());
        assert!(!cb.allow());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(cb.allow());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let cb = breaker(1, 50, 1);

        cb.record_failure(&failure());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(cb.allow());

        cb.record_failure(&failure());
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow());
    }

    #[tokio::test]
    async fn test_half_open_successes_close() {
        let cb = breaker(1, 50, 2);

        cb.record_failure(&failure());
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(cb.allow());
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        assert!(cb.allow());
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_caps_trial_calls() {
        let cb = breaker(1, 50, 5);

        cb.record_failure(&failure());
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(cb.allow()); // first trial, triggers half-open
        assert!(cb.allow()); // second trial, at the cap of 2
        assert!(!cb.allow()); // third is rejected

        // A trial completing frees a slot
        cb.record_success();
        assert!(cb.allow());
    }
}
