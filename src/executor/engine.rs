//! Composition root wiring cache, breaker, failover, and retry together.

use crate::breaker::circuit_breaker::CircuitBreaker;
use crate::breaker::registry::BreakerRegistry;
use crate::cache::store::TieredCache;
use crate::cache::sweeper::Sweeper;
use crate::config::loader::ConfigError;
use crate::config::schema::{EngineConfig, HealthCheckConfig};
use crate::config::validation::{validate_config, ValidationError};
use crate::errors::{
    DependencyError, ErrorClassifier, ErrorKind, ExecutionError, ExecutionResult, KindClassifier,
};
use crate::executor::options::ExecuteOptions;
use crate::executor::summary::{EngineSummary, ExecutorCounters};
use crate::failover::endpoint::Endpoint;
use crate::failover::manager::{FailoverManager, FailoverStrategy};
use crate::health::scheduler::{HealthCheck, HealthCheckScheduler};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::retry::policy::{RetryPolicy, RetryPredicate};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time;
use tracing::Instrument;
use uuid::Uuid;

/// Executes operations against unreliable dependencies.
///
/// Owns every piece of shared state explicitly: the cache, the breaker
/// registry, and one endpoint table per configured dependency. Construct one
/// per process and share it behind an `Arc`; all methods take `&self`.
pub struct ResilientExecutor {
    cache: Arc<TieredCache>,
    breakers: BreakerRegistry,
    managers: HashMap<String, Arc<FailoverManager>>,
    scheduler: HealthCheckScheduler,
    retry: RetryPolicy,
    attempt_timeout: Duration,
    operation_deadline: Duration,
    sweep_interval: Duration,
    health_defaults: HealthCheckConfig,
    shutdown: Arc<Shutdown>,
    retries: AtomicU64,
    failovers: AtomicU64,
    fallbacks: AtomicU64,
}

impl ResilientExecutor {
    /// Build the engine from a validated configuration with the default
    /// error classifier.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        Self::with_classifier(config, Arc::new(KindClassifier::default()))
    }

    /// Build the engine with a custom error classifier shared by the breakers
    /// and the retry policy.
    pub fn with_classifier(
        config: EngineConfig,
        classifier: Arc<dyn ErrorClassifier>,
    ) -> Result<Self, ConfigError> {
        validate_config(&config).map_err(ConfigError::Validation)?;

        let shutdown = Arc::new(Shutdown::new());
        let mut managers = HashMap::new();
        for dep in &config.dependencies {
            let manager =
                FailoverManager::from_config(dep).map_err(|e| ConfigError::Validation(vec![e]))?;
            managers.insert(dep.name.clone(), Arc::new(manager));
        }

        tracing::info!(
            dependencies = managers.len(),
            cache_policy = config.cache.eviction_policy.as_str(),
            max_attempts = config.retry.max_attempts,
            "Resilient executor created"
        );

        Ok(Self {
            cache: Arc::new(TieredCache::new(&config.cache)),
            breakers: BreakerRegistry::new(config.breaker.clone(), classifier.clone()),
            managers,
            scheduler: HealthCheckScheduler::new(shutdown.clone()),
            retry: RetryPolicy::from_config(&config.retry, classifier),
            attempt_timeout: Duration::from_millis(config.timeouts.attempt_ms),
            operation_deadline: Duration::from_millis(config.timeouts.operation_ms),
            sweep_interval: Duration::from_millis(config.cache.sweep_interval_ms),
            health_defaults: config.health_check.clone(),
            shutdown,
            retries: AtomicU64::new(0),
            failovers: AtomicU64::new(0),
            fallbacks: AtomicU64::new(0),
        })
    }

    /// Register an extra retryability predicate (OR-combined with the
    /// classifier's). Call before sharing the executor.
    pub fn with_retry_predicate(mut self, predicate: RetryPredicate) -> Self {
        self.retry.add_predicate(predicate);
        self
    }

    /// Spawn the background cache sweeper. Call once, inside a runtime.
    pub fn start(&self) {
        let sweeper = Sweeper::new(self.cache.clone(), self.sweep_interval);
        tokio::spawn(sweeper.run(self.shutdown.subscribe()));
    }

    /// Schedule a periodic probe against one endpoint of a dependency.
    ///
    /// Probe results feed the endpoint's health state and the dependency's
    /// breaker; they never run on the request path. A no-op when probing is
    /// disabled in the configuration.
    pub fn register_health_probe<F, Fut>(
        &self,
        dependency: &str,
        endpoint_id: &str,
        probe: F,
    ) -> Result<(), ValidationError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), DependencyError>> + Send + 'static,
    {
        let manager = self.managers.get(dependency).ok_or_else(|| {
            ValidationError::new(format!("dependencies.{}", dependency), "unknown dependency")
        })?;
        let endpoint = manager.endpoint_by_id(endpoint_id).ok_or_else(|| {
            ValidationError::new(
                format!("dependencies.{}.endpoints.{}", dependency, endpoint_id),
                "unknown endpoint",
            )
        })?;

        if !self.health_defaults.enabled {
            tracing::debug!(dependency, endpoint = endpoint_id, "Health probing disabled, probe not registered");
            return Ok(());
        }

        let check = HealthCheck::new(
            format!("{}/{}", dependency, endpoint_id),
            Duration::from_millis(self.health_defaults.interval_ms),
            Duration::from_millis(self.health_defaults.timeout_ms),
            probe,
        );
        self.scheduler
            .register(check, endpoint, self.breakers.get_or_create(dependency));
        Ok(())
    }

    /// Run `operation` with the full pipeline: cache, breaker gate, endpoint
    /// selection, retry with backoff, and failover per the dependency's
    /// configured strategy.
    ///
    /// The caller receives the value, a terminal [`ExecutionError`], or the
    /// fallback value when one is configured.
    pub async fn execute<F, Fut>(&self, options: ExecuteOptions, operation: F) -> ExecutionResult<Value>
    where
        F: Fn(Arc<Endpoint>) -> Fut,
        Fut: Future<Output = Result<Value, DependencyError>>,
    {
        let operation_id = Uuid::new_v4();
        let span =
            tracing::debug_span!("execute", %operation_id, dependency = %options.dependency);

        async move {
            if let Some(key) = &options.cache_key {
                if let Some(value) = self.cache.get(key) {
                    tracing::debug!(key = %key, "Cache hit, dependency not called");
                    return Ok(value);
                }
            }

            let breaker = self.breakers.get_or_create(&options.dependency);
            if !breaker.allow() {
                let err = ExecutionError::CircuitOpen {
                    dependency: options.dependency.clone(),
                };
                return self.consult_fallback(err, &options);
            }

            let Some(manager) = self.managers.get(&options.dependency) else {
                return Err(ExecutionError::UnknownDependency {
                    dependency: options.dependency.clone(),
                });
            };

            let attempt_timeout = options.timeout.unwrap_or(self.attempt_timeout);
            let deadline = options.deadline.unwrap_or(self.operation_deadline);
            let started = Instant::now();

            let result = match manager.strategy() {
                FailoverStrategy::Immediate | FailoverStrategy::Graceful => {
                    self.run_reselecting(
                        &operation,
                        manager,
                        &breaker,
                        &options.dependency,
                        attempt_timeout,
                        deadline,
                        started,
                    )
                    .await
                }
                FailoverStrategy::RetryThenFailover => {
                    self.run_retry_then_failover(
                        &operation,
                        manager,
                        &breaker,
                        &options.dependency,
                        attempt_timeout,
                        deadline,
                        started,
                    )
                    .await
                }
                FailoverStrategy::Cascade => {
                    self.run_cascade(
                        &operation,
                        manager,
                        &breaker,
                        &options.dependency,
                        attempt_timeout,
                        deadline,
                        started,
                    )
                    .await
                }
            };

            match result {
                Ok(value) => {
                    if let Some(key) = &options.cache_key {
                        self.cache.set(key, value.clone(), options.cache.clone());
                    }
                    Ok(value)
                }
                Err(err) => self.consult_fallback(err, &options),
            }
        }
        .instrument(span)
        .await
    }

    /// [`execute`](Self::execute) with stampede control: concurrent calls for
    /// the same key collapse to a single dependency call through the cache's
    /// coalescing, and every caller shares its result or its error.
    ///
    /// The shared error is flattened to a [`DependencyError`] carrying the
    /// terminal error's kind and full context string.
    pub async fn get_cached_or_execute<F, Fut>(
        &self,
        key: &str,
        options: ExecuteOptions,
        operation: F,
    ) -> Result<Value, DependencyError>
    where
        F: Fn(Arc<Endpoint>) -> Fut,
        Fut: Future<Output = Result<Value, DependencyError>>,
    {
        self.cache
            .get_or_compute(key, options.cache.clone(), move || async move {
                // The coalescing layer stores the result; executing with a
                // cache_key as well would double-write it.
                let mut options = options;
                options.cache_key = None;
                self.execute(options, operation)
                    .await
                    .map_err(|e| DependencyError::from(&e))
            })
            .await
    }

    /// Point-in-time snapshot of every subsystem.
    pub fn summary(&self) -> EngineSummary {
        let mut dependencies: Vec<_> = self.managers.values().map(|m| m.snapshot()).collect();
        dependencies.sort_by(|a, b| a.dependency.cmp(&b.dependency));
        EngineSummary {
            cache: self.cache.stats(),
            breakers: self.breakers.snapshot_all(),
            dependencies,
            probes: self.scheduler.snapshot(),
            counters: ExecutorCounters {
                retries: self.retries.load(Ordering::Relaxed),
                failovers: self.failovers.load(Ordering::Relaxed),
                fallbacks: self.fallbacks.load(Ordering::Relaxed),
            },
        }
    }

    /// The shared cache, for direct invalidation after mutations.
    pub fn cache(&self) -> &TieredCache {
        &self.cache
    }

    /// Stop every background task (sweeper, health probes) and wait for the
    /// probe tasks to exit.
    pub async fn shutdown(&self) {
        self.shutdown.trigger();
        self.scheduler.join_all().await;
    }

    fn consult_fallback(
        &self,
        err: ExecutionError,
        options: &ExecuteOptions,
    ) -> ExecutionResult<Value> {
        if let Some(fallback) = &options.fallback {
            self.fallbacks.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                dependency = %options.dependency,
                error = %err,
                "Serving fallback value"
            );
            return Ok(fallback());
        }
        Err(err)
    }

    /// Immediate and Graceful: re-select the endpoint before every attempt so
    /// the manager's switching rule takes effect mid-call.
    #[allow(clippy::too_many_arguments)]
    async fn run_reselecting<F, Fut>(
        &self,
        operation: &F,
        manager: &FailoverManager,
        breaker: &Arc<CircuitBreaker>,
        dependency: &str,
        attempt_timeout: Duration,
        deadline: Duration,
        started: Instant,
    ) -> ExecutionResult<Value>
    where
        F: Fn(Arc<Endpoint>) -> Fut,
        Fut: Future<Output = Result<Value, DependencyError>>,
    {
        let mut attempt = 1u32;
        let mut previous: Option<String> = None;
        loop {
            let Some(remaining) = remaining_budget(deadline, started) else {
                return Err(deadline_error(dependency, started));
            };
            let endpoint = manager.select_endpoint();
            if previous.as_deref().is_some_and(|p| p != endpoint.id()) {
                self.failovers.fetch_add(1, Ordering::Relaxed);
                metrics::record_failover_switch(dependency);
            }
            previous = Some(endpoint.id().to_string());

            match attempt_call(operation, &endpoint, attempt_timeout.min(remaining)).await {
                Ok(value) => {
                    breaker.record_success();
                    manager.record_success(&endpoint);
                    return Ok(value);
                }
                Err(err) => {
                    breaker.record_failure(&err);
                    manager.record_failure(&endpoint);
                    tracing::warn!(
                        dependency,
                        endpoint = %endpoint.id(),
                        attempt,
                        error = %err,
                        "Attempt failed"
                    );
                    if !self.retry.is_retryable(&err) {
                        return Err(ExecutionError::Terminal {
                            dependency: dependency.to_string(),
                            endpoint: endpoint.id().to_string(),
                            attempts: attempt,
                            source: err,
                        });
                    }
                    if attempt >= self.retry.max_attempts() {
                        return Err(ExecutionError::RetryExhausted {
                            dependency: dependency.to_string(),
                            endpoint: endpoint.id().to_string(),
                            attempts: attempt,
                            source: err,
                        });
                    }
                    self.backoff(dependency, attempt, deadline, started).await?;
                    attempt += 1;
                }
            }
        }
    }

    /// RetryThenFailover: spend the whole retry budget on the current
    /// endpoint, then advance, with a fresh budget per endpoint. Stops once
    /// every endpoint has been visited.
    #[allow(clippy::too_many_arguments)]
    async fn run_retry_then_failover<F, Fut>(
        &self,
        operation: &F,
        manager: &FailoverManager,
        breaker: &Arc<CircuitBreaker>,
        dependency: &str,
        attempt_timeout: Duration,
        deadline: Duration,
        started: Instant,
    ) -> ExecutionResult<Value>
    where
        F: Fn(Arc<Endpoint>) -> Fut,
        Fut: Future<Output = Result<Value, DependencyError>>,
    {
        let mut endpoint = manager.select_endpoint();
        let mut visited: HashSet<String> = HashSet::new();
        let mut total_attempts = 0u32;

        loop {
            visited.insert(endpoint.id().to_string());

            let mut attempt = 1u32;
            let last_err = loop {
                let Some(remaining) = remaining_budget(deadline, started) else {
                    return Err(deadline_error(dependency, started));
                };
                total_attempts += 1;
                match attempt_call(operation, &endpoint, attempt_timeout.min(remaining)).await {
                    Ok(value) => {
                        breaker.record_success();
                        manager.record_success(&endpoint);
                        return Ok(value);
                    }
                    Err(err) => {
                        breaker.record_failure(&err);
                        manager.record_failure(&endpoint);
                        tracing::warn!(
                            dependency,
                            endpoint = %endpoint.id(),
                            attempt,
                            error = %err,
                            "Attempt failed"
                        );
                        if !self.retry.is_retryable(&err) {
                            return Err(ExecutionError::Terminal {
                                dependency: dependency.to_string(),
                                endpoint: endpoint.id().to_string(),
                                attempts: total_attempts,
                                source: err,
                            });
                        }
                        if attempt >= self.retry.max_attempts() {
                            break err;
                        }
                        self.backoff(dependency, attempt, deadline, started).await?;
                        attempt += 1;
                    }
                }
            };

            let next = manager.advance_from(&endpoint);
            if next.id() == endpoint.id() || visited.contains(next.id()) {
                return Err(ExecutionError::FailoverExhausted {
                    dependency: dependency.to_string(),
                    attempts: total_attempts,
                    source: last_err,
                });
            }
            self.failovers.fetch_add(1, Ordering::Relaxed);
            metrics::record_failover_switch(dependency);
            endpoint = next;
        }
    }

    /// Cascade: one attempt per endpoint in strict priority order.
    #[allow(clippy::too_many_arguments)]
    async fn run_cascade<F, Fut>(
        &self,
        operation: &F,
        manager: &FailoverManager,
        breaker: &Arc<CircuitBreaker>,
        dependency: &str,
        attempt_timeout: Duration,
        deadline: Duration,
        started: Instant,
    ) -> ExecutionResult<Value>
    where
        F: Fn(Arc<Endpoint>) -> Fut,
        Fut: Future<Output = Result<Value, DependencyError>>,
    {
        let order = manager.cascade_order();
        let mut last_err: Option<DependencyError> = None;
        let mut attempts = 0u32;

        for (position, endpoint) in order.iter().enumerate() {
            let Some(remaining) = remaining_budget(deadline, started) else {
                return Err(deadline_error(dependency, started));
            };
            if position > 0 {
                self.failovers.fetch_add(1, Ordering::Relaxed);
                metrics::record_failover_switch(dependency);
            }
            attempts += 1;

            match attempt_call(operation, endpoint, attempt_timeout.min(remaining)).await {
                Ok(value) => {
                    breaker.record_success();
                    manager.record_success(endpoint);
                    return Ok(value);
                }
                Err(err) => {
                    breaker.record_failure(&err);
                    manager.record_failure(endpoint);
                    tracing::warn!(
                        dependency,
                        endpoint = %endpoint.id(),
                        position,
                        error = %err,
                        "Cascade attempt failed"
                    );
                    if !self.retry.is_retryable(&err) {
                        return Err(ExecutionError::Terminal {
                            dependency: dependency.to_string(),
                            endpoint: endpoint.id().to_string(),
                            attempts,
                            source: err,
                        });
                    }
                    last_err = Some(err);
                    if position + 1 < order.len() {
                        self.backoff(dependency, attempts, deadline, started).await?;
                    }
                }
            }
        }

        Err(ExecutionError::FailoverExhausted {
            dependency: dependency.to_string(),
            attempts,
            source: last_err.unwrap_or_else(|| {
                DependencyError::new(ErrorKind::Internal, "no endpoints attempted")
            }),
        })
    }

    /// Sleep the backoff delay for `attempt`, clamped to the remaining
    /// deadline, and count the upcoming retry.
    async fn backoff(
        &self,
        dependency: &str,
        attempt: u32,
        deadline: Duration,
        started: Instant,
    ) -> Result<(), ExecutionError> {
        let Some(remaining) = remaining_budget(deadline, started) else {
            return Err(deadline_error(dependency, started));
        };
        let delay = self.retry.delay_within(attempt, remaining);
        if !delay.is_zero() {
            time::sleep(delay).await;
        }
        self.retries.fetch_add(1, Ordering::Relaxed);
        metrics::record_retry_attempt(dependency);
        Ok(())
    }
}

/// One timed call against `endpoint`, counted as in-flight for its duration.
async fn attempt_call<F, Fut>(
    operation: &F,
    endpoint: &Arc<Endpoint>,
    budget: Duration,
) -> Result<Value, DependencyError>
where
    F: Fn(Arc<Endpoint>) -> Fut,
    Fut: Future<Output = Result<Value, DependencyError>>,
{
    let _guard = endpoint.begin_call();
    match time::timeout(budget, operation(endpoint.clone())).await {
        Ok(result) => result,
        Err(_) => Err(DependencyError::timeout(budget.as_millis() as u64)),
    }
}

fn remaining_budget(deadline: Duration, started: Instant) -> Option<Duration> {
    deadline
        .checked_sub(started.elapsed())
        .filter(|r| !r.is_zero())
}

fn deadline_error(dependency: &str, started: Instant) -> ExecutionError {
    ExecutionError::DeadlineExceeded {
        dependency: dependency.to_string(),
        elapsed_ms: started.elapsed().as_millis() as u64,
    }
}
