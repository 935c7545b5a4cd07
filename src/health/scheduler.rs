//! Timer-driven health probing.
//!
//! # Responsibilities
//! - Run each registered probe on its own interval, off the request path
//! - Count a probe that exceeds its timeout as a failure
//! - Feed results to the endpoint's health state and the dependency's breaker

use crate::breaker::circuit_breaker::CircuitBreaker;
use crate::errors::DependencyError;
use crate::failover::endpoint::Endpoint;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;
use tokio::time;

/// Boxed async probe. Returns `Ok(())` when the target answered.
pub type ProbeFn = Arc<dyn Fn() -> BoxFuture<'static, Result<(), DependencyError>> + Send + Sync>;

/// One registered probe.
pub struct HealthCheck {
    pub name: String,
    pub probe: ProbeFn,
    pub interval: Duration,
    pub timeout: Duration,
}

impl HealthCheck {
    pub fn new<F, Fut>(name: impl Into<String>, interval: Duration, timeout: Duration, probe: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), DependencyError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            probe: Arc::new(move || probe().boxed()),
            interval,
            timeout,
        }
    }
}

/// Last observed result of one probe.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeResult {
    pub check: String,
    pub healthy: bool,
    pub latency_ms: u64,
    pub error: Option<String>,
    pub at_epoch_ms: u64,
}

/// Runs registered probes on independent timers.
///
/// Every probe task subscribes to the shutdown broadcast, so stopping the
/// engine provably stops the timers.
pub struct HealthCheckScheduler {
    results: Arc<DashMap<String, ProbeResult>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    shutdown: Arc<Shutdown>,
}

impl HealthCheckScheduler {
    pub fn new(shutdown: Arc<Shutdown>) -> Self {
        Self {
            results: Arc::new(DashMap::new()),
            handles: Mutex::new(Vec::new()),
            shutdown,
        }
    }

    /// Spawn the timer task for `check`, feeding `endpoint` and `breaker`.
    ///
    /// The first probe is splayed by a random fraction of the interval so
    /// co-registered checks do not fire in lockstep.
    pub fn register(&self, check: HealthCheck, endpoint: Arc<Endpoint>, breaker: Arc<CircuitBreaker>) {
        tracing::info!(
            check = %check.name,
            interval_ms = check.interval.as_millis() as u64,
            timeout_ms = check.timeout.as_millis() as u64,
            "Health probe registered"
        );

        let results = self.results.clone();
        let mut shutdown_rx = self.shutdown.subscribe();
        let handle = tokio::spawn(async move {
            let splay_ms = fastrand::u64(0..check.interval.as_millis().max(1) as u64);
            tokio::select! {
                _ = time::sleep(Duration::from_millis(splay_ms)) => {}
                _ = shutdown_rx.recv() => {
                    return;
                }
            }

            let mut ticker = time::interval(check.interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        run_probe(&check, &endpoint, &breaker, &results).await;
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::info!(check = %check.name, "Health probe received shutdown signal, exiting loop");
                        break;
                    }
                }
            }
        });

        self.handles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(handle);
    }

    /// Last result of every probe, sorted by check name.
    pub fn snapshot(&self) -> Vec<ProbeResult> {
        let mut results: Vec<ProbeResult> =
            self.results.iter().map(|r| r.value().clone()).collect();
        results.sort_by(|a, b| a.check.cmp(&b.check));
        results
    }

    pub fn task_count(&self) -> usize {
        self.handles.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Await every probe task. Call after triggering shutdown.
    pub async fn join_all(&self) {
        let handles: Vec<JoinHandle<()>> = self
            .handles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        for handle in handles {
            let _ = handle.await;
        }
    }
}

async fn run_probe(
    check: &HealthCheck,
    endpoint: &Arc<Endpoint>,
    breaker: &Arc<CircuitBreaker>,
    results: &DashMap<String, ProbeResult>,
) {
    let started = Instant::now();
    let outcome = time::timeout(check.timeout, (check.probe)()).await;
    let latency = started.elapsed();

    let error = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(e)) => {
            tracing::warn!(check = %check.name, error = %e, "Health probe failed");
            Some(e)
        }
        Err(_) => {
            tracing::warn!(check = %check.name, "Health probe failed: timeout");
            Some(DependencyError::timeout(check.timeout.as_millis() as u64))
        }
    };

    let healthy = error.is_none();
    if healthy {
        endpoint.mark_success(Some(latency));
        breaker.record_success();
    } else if let Some(err) = &error {
        endpoint.mark_failure();
        breaker.record_failure(err);
    }

    metrics::record_probe_result(&check.name, healthy, latency);
    results.insert(
        check.name.clone(),
        ProbeResult {
            check: check.name.clone(),
            healthy,
            latency_ms: latency.as_millis() as u64,
            error: error.map(|e| e.to_string()),
            at_epoch_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
        },
    );
}
