//! Retry budget and retryability classification.

use crate::config::schema::RetryConfig;
use crate::errors::{DependencyError, ErrorClassifier};
use crate::retry::backoff;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Backoff schedule shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    None,
    Linear,
    Exponential,
    Jittered,
}

/// Decides whether a given error permits another attempt.
pub type RetryPredicate = Arc<dyn Fn(&DependencyError) -> bool + Send + Sync>;

/// Retry schedule plus retryability predicates.
///
/// Predicates are OR-combined: any match permits retry. A fresh attempt
/// counter is kept by the executor per logical call; the policy itself is
/// immutable and shared.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    strategy: BackoffStrategy,
    base_delay: Duration,
    max_delay: Duration,
    predicates: Vec<RetryPredicate>,
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        strategy: BackoffStrategy,
        base_delay: Duration,
        max_delay: Duration,
    ) -> Self {
        Self {
            max_attempts,
            strategy,
            base_delay,
            max_delay,
            predicates: Vec::new(),
        }
    }

    /// Build from config with the classifier's retryability as the base predicate.
    pub fn from_config(config: &RetryConfig, classifier: Arc<dyn ErrorClassifier>) -> Self {
        let mut policy = Self::new(
            config.max_attempts,
            config.strategy,
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        );
        policy.add_predicate(Arc::new(move |err: &DependencyError| classifier.retryable(err)));
        policy
    }

    /// Register an additional retryability predicate (OR-combined).
    pub fn add_predicate(&mut self, predicate: RetryPredicate) {
        self.predicates.push(predicate);
    }

    /// Delay to wait before the attempt numbered `attempt` (1-based).
    pub fn compute_delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_millis() as u64;
        let max = self.max_delay.as_millis() as u64;
        let ms = match self.strategy {
            BackoffStrategy::None => 0,
            BackoffStrategy::Linear => backoff::linear_delay(attempt, base, max),
            BackoffStrategy::Exponential => backoff::exponential_delay(attempt, base, max),
            BackoffStrategy::Jittered => backoff::jittered_delay(attempt, base, max),
        };
        Duration::from_millis(ms)
    }

    /// Whether any registered predicate permits repeating after `err`,
    /// ignoring the attempt budget.
    pub fn is_retryable(&self, err: &DependencyError) -> bool {
        self.predicates.iter().any(|p| p(err))
    }

    /// Whether attempt number `attempt` (just failed with `err`) may be repeated.
    pub fn should_retry(&self, attempt: u32, err: &DependencyError) -> bool {
        attempt < self.max_attempts && self.is_retryable(err)
    }

    /// Delay for `attempt`, clamped so the sleep never outlives `remaining`.
    pub fn delay_within(&self, attempt: u32, remaining: Duration) -> Duration {
        self.compute_delay(attempt).min(remaining)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("strategy", &self.strategy)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("predicates", &self.predicates.len())
            .finish()
    }
}
