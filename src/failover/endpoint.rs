//! Endpoint abstraction.
//!
//! # Responsibilities
//! - Represent a single ranked endpoint of a dependency
//! - Track in-flight calls (for graceful failover draining)
//! - Track health state with hysteresis thresholds

use serde::Serialize;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use url::Url;

/// Health state enum.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointHealth {
    /// Full member of the selection pool.
    Healthy = 0,
    /// Responding, but slowly; selectable only when nothing healthy remains.
    Degraded = 1,
    /// Excluded from selection until probes report recovery.
    Unhealthy = 2,
}

impl From<u8> for EndpointHealth {
    fn from(val: u8) -> Self {
        match val {
            1 => EndpointHealth::Degraded,
            2 => EndpointHealth::Unhealthy,
            _ => EndpointHealth::Healthy,
        }
    }
}

/// Point-in-time view for the observability summary.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointSnapshot {
    pub id: String,
    pub url: String,
    pub priority: u32,
    pub health: EndpointHealth,
    pub consecutive_failures: usize,
    pub in_flight: usize,
    pub last_checked_at_ms: u64,
    pub last_failed_at_ms: u64,
}

/// A single endpoint of a dependency.
///
/// Health bookkeeping is atomics-only so request-path reads and probe-path
/// writes never contend on a lock.
#[derive(Debug)]
pub struct Endpoint {
    id: String,
    url: Url,
    priority: u32,
    state: AtomicU8,
    consecutive_failures: AtomicUsize,
    consecutive_successes: AtomicUsize,
    in_flight: AtomicUsize,
    last_checked_at_ms: AtomicU64,
    last_failed_at_ms: AtomicU64,
    healthy_threshold: usize,
    unhealthy_threshold: usize,
    degraded_after: Duration,
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl Endpoint {
    pub fn new(
        id: String,
        url: Url,
        priority: u32,
        healthy_threshold: usize,
        unhealthy_threshold: usize,
        degraded_after: Duration,
    ) -> Self {
        Self {
            id,
            url,
            priority,
            state: AtomicU8::new(EndpointHealth::Healthy as u8),
            consecutive_failures: AtomicUsize::new(0),
            consecutive_successes: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            last_checked_at_ms: AtomicU64::new(0),
            last_failed_at_ms: AtomicU64::new(0),
            healthy_threshold,
            unhealthy_threshold,
            degraded_after,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn health(&self) -> EndpointHealth {
        EndpointHealth::from(self.state.load(Ordering::Relaxed))
    }

    /// Whether selection may route traffic here at all.
    pub fn is_selectable(&self) -> bool {
        self.health() != EndpointHealth::Unhealthy
    }

    pub fn consecutive_failures(&self) -> usize {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub fn last_failed_at_ms(&self) -> u64 {
        self.last_failed_at_ms.load(Ordering::Relaxed)
    }

    /// Create a guard that counts this call as in-flight until dropped.
    pub fn begin_call(self: &Arc<Self>) -> CallGuard {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        CallGuard {
            endpoint: self.clone(),
        }
    }

    /// Report a successful request or probe.
    ///
    /// Probes pass their measured latency; request-path successes pass `None`.
    /// A success slower than `degraded_after` marks the endpoint degraded
    /// rather than advancing it toward healthy.
    pub fn mark_success(&self, latency: Option<Duration>) {
        self.last_checked_at_ms.store(epoch_ms(), Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);

        if let Some(latency) = latency {
            if latency > self.degraded_after {
                self.consecutive_successes.store(0, Ordering::Relaxed);
                let prev = self.state.swap(EndpointHealth::Degraded as u8, Ordering::Relaxed);
                if prev != EndpointHealth::Degraded as u8 {
                    tracing::info!(
                        endpoint = %self.id,
                        latency_ms = latency.as_millis() as u64,
                        "Endpoint responding slowly, marked degraded"
                    );
                }
                return;
            }
        }

        if self.state.load(Ordering::Relaxed) == EndpointHealth::Healthy as u8 {
            return;
        }

        let successes = self.consecutive_successes.fetch_add(1, Ordering::Relaxed) + 1;
        if successes >= self.healthy_threshold {
            self.state.store(EndpointHealth::Healthy as u8, Ordering::Relaxed);
            self.consecutive_successes.store(0, Ordering::Relaxed);
            tracing::info!(endpoint = %self.id, "Endpoint recovered, marked healthy");
        }
    }

    /// Report a failed request or probe.
    pub fn mark_failure(&self) {
        let now = epoch_ms();
        self.last_checked_at_ms.store(now, Ordering::Relaxed);
        self.last_failed_at_ms.store(now, Ordering::Relaxed);
        self.consecutive_successes.store(0, Ordering::Relaxed);

        if self.state.load(Ordering::Relaxed) == EndpointHealth::Unhealthy as u8 {
            return;
        }

        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= self.unhealthy_threshold {
            self.state.store(EndpointHealth::Unhealthy as u8, Ordering::Relaxed);
            tracing::warn!(
                endpoint = %self.id,
                consecutive_failures = failures,
                "Endpoint marked unhealthy, excluded from selection"
            );
        }
    }

    pub fn snapshot(&self) -> EndpointSnapshot {
        EndpointSnapshot {
            id: self.id.clone(),
            url: self.url.to_string(),
            priority: self.priority,
            health: self.health(),
            consecutive_failures: self.consecutive_failures(),
            in_flight: self.in_flight(),
            last_checked_at_ms: self.last_checked_at_ms.load(Ordering::Relaxed),
            last_failed_at_ms: self.last_failed_at_ms.load(Ordering::Relaxed),
        }
    }
}

/// A RAII guard that manages the in-flight call count.
#[derive(Debug)]
pub struct CallGuard {
    endpoint: Arc<Endpoint>,
}

impl Deref for CallGuard {
    type Target = Endpoint;
    fn deref(&self) -> &Self::Target {
        &self.endpoint
    }
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        self.endpoint.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> Arc<Endpoint> {
        Arc::new(Endpoint::new(
            "primary".to_string(),
            Url::parse("https://store-1.internal:5432").unwrap(),
            0,
            2,
            3,
            Duration::from_millis(500),
        ))
    }

    #[test]
    fn test_unhealthy_after_threshold() {
        let ep = endpoint();

        ep.mark_failure();
        ep.mark_failure();
        assert_eq!(ep.health(), EndpointHealth::Healthy);
        assert!(ep.is_selectable());

        ep.mark_failure();
        assert_eq!(ep.health(), EndpointHealth::Unhealthy);
        assert!(!ep.is_selectable());
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let ep = endpoint();

        ep.mark_failure();
        ep.mark_failure();
        ep.mark_success(None);
        ep.mark_failure();
        ep.mark_failure();
        assert_eq!(ep.health(), EndpointHealth::Healthy);
    }

    #[test]
    fn test_recovery_needs_consecutive_successes() {
        let ep = endpoint();
        for _ in 0..3 {
            ep.mark_failure();
        }
        assert_eq!(ep.health(), EndpointHealth::Unhealthy);

        ep.mark_success(Some(Duration::from_millis(10)));
        assert_eq!(ep.health(), EndpointHealth::Unhealthy);

        ep.mark_success(Some(Duration::from_millis(10)));
        assert_eq!(ep.health(), EndpointHealth::Healthy);
    }

    #[test]
    fn test_slow_probe_marks_degraded() {
        let ep = endpoint();
        ep.mark_success(Some(Duration::from_millis(900)));
        assert_eq!(ep.health(), EndpointHealth::Degraded);
        assert!(ep.is_selectable());

        // Fast probes walk it back to healthy through the hysteresis
        ep.mark_success(Some(Duration::from_millis(10)));
        ep.mark_success(Some(Duration::from_millis(10)));
        assert_eq!(ep.health(), EndpointHealth::Healthy);
    }

    #[test]
    fn test_call_guard_tracks_in_flight() {
        let ep = endpoint();
        assert_eq!(ep.in_flight(), 0);

        let g1 = ep.begin_call();
        let g2 = ep.begin_call();
        assert_eq!(ep.in_flight(), 2);

        drop(g1);
        assert_eq!(ep.in_flight(), 1);
        drop(g2);
        assert_eq!(ep.in_flight(), 0);
    }

    #[test]
    fn test_snapshot_reflects_state() {
        let ep = endpoint();
        ep.mark_failure();

        let snap = ep.snapshot();
        assert_eq!(snap.id, "primary");
        assert_eq!(snap.consecutive_failures, 1);
        assert!(snap.last_failed_at_ms > 0);
    }
}
