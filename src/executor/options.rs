//! Per-call execution options.

use crate::cache::entry::SetOptions;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Degraded-value supplier consulted when the call cannot succeed.
pub type FallbackFn = Arc<dyn Fn() -> Value + Send + Sync>;

/// Options for one logical call through the executor.
///
/// Unset timeouts fall back to the engine's configured defaults.
#[derive(Clone)]
pub struct ExecuteOptions {
    /// Dependency name; keys the breaker and the endpoint table.
    pub dependency: String,
    /// When set, the cache is consulted first and the result stored after.
    pub cache_key: Option<String>,
    /// Cache write options (TTL, tags, priority) for the stored result.
    pub cache: SetOptions,
    /// Per-attempt timeout.
    pub timeout: Option<Duration>,
    /// Overall deadline bounding all attempts plus backoff sleeps.
    pub deadline: Option<Duration>,
    /// Served instead of a terminal error when configured.
    pub fallback: Option<FallbackFn>,
}

impl ExecuteOptions {
    pub fn new(dependency: impl Into<String>) -> Self {
        Self {
            dependency: dependency.into(),
            cache_key: None,
            cache: SetOptions::default(),
            timeout: None,
            deadline: None,
            fallback: None,
        }
    }

    /// Cache the result under `key`.
    pub fn cached(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    /// Cache write options for the stored result.
    pub fn cache_options(mut self, opts: SetOptions) -> Self {
        self.cache = opts;
        self
    }

    /// Per-attempt timeout override.
    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Overall deadline override.
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Degraded value served when all attempts and endpoints are spent.
    pub fn fallback<F>(mut self, fallback: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.fallback = Some(Arc::new(fallback));
        self
    }
}

impl std::fmt::Debug for ExecuteOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecuteOptions")
            .field("dependency", &self.dependency)
            .field("cache_key", &self.cache_key)
            .field("timeout", &self.timeout)
            .field("deadline", &self.deadline)
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}
