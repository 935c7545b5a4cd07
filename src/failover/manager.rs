//! Ranked endpoint selection and failover.
//!
//! # Responsibilities
//! - Hold the ordered endpoint list for one dependency
//! - Keep exactly one endpoint active for routing at any instant
//! - Apply the configured escalation strategy on failure

use crate::config::schema::DependencyConfig;
use crate::config::validation::ValidationError;
use crate::failover::endpoint::{Endpoint, EndpointHealth, EndpointSnapshot};
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// How traffic escalates across endpoints when the current one fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailoverStrategy {
    /// Switch the active endpoint on the very first failure.
    Immediate,
    /// Switch on failure, but only once in-flight calls against the current
    /// endpoint have drained.
    Graceful,
    /// Exhaust the retry budget against the current endpoint before switching.
    RetryThenFailover,
    /// Try each endpoint in strict priority order until one succeeds.
    Cascade,
}

impl FailoverStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailoverStrategy::Immediate => "immediate",
            FailoverStrategy::Graceful => "graceful",
            FailoverStrategy::RetryThenFailover => "retry-then-failover",
            FailoverStrategy::Cascade => "cascade",
        }
    }
}

/// Point-in-time view of one dependency's endpoint table.
#[derive(Debug, Clone, Serialize)]
pub struct DependencySnapshot {
    pub dependency: String,
    pub strategy: FailoverStrategy,
    pub active_endpoint: String,
    pub endpoints: Vec<EndpointSnapshot>,
}

/// Endpoint table and selection logic for one dependency.
///
/// The active endpoint is a lock-free pointer swapped on selection changes;
/// reads on the request path never block.
pub struct FailoverManager {
    dependency: String,
    strategy: FailoverStrategy,
    endpoints: Vec<Arc<Endpoint>>,
    active: ArcSwap<Endpoint>,
    pending_switch: AtomicBool,
}

impl FailoverManager {
    /// Build the endpoint table from config.
    ///
    /// Endpoints are sorted by priority with a stable sort, so equal
    /// priorities keep their registration order.
    pub fn from_config(config: &DependencyConfig) -> Result<Self, ValidationError> {
        let mut endpoints = Vec::with_capacity(config.endpoints.len());
        for ep in &config.endpoints {
            let url = Url::parse(&ep.url).map_err(|e| {
                ValidationError::new(
                    format!("dependencies.{}.endpoints.{}.url", config.name, ep.id),
                    e.to_string(),
                )
            })?;
            endpoints.push(Arc::new(Endpoint::new(
                ep.id.clone(),
                url,
                ep.priority,
                config.healthy_threshold as usize,
                config.unhealthy_threshold as usize,
                Duration::from_millis(config.degraded_after_ms),
            )));
        }
        if endpoints.is_empty() {
            return Err(ValidationError::new(
                format!("dependencies.{}.endpoints", config.name),
                "at least one endpoint is required",
            ));
        }
        endpoints.sort_by_key(|e| e.priority());

        let active = ArcSwap::from(endpoints[0].clone());
        tracing::info!(
            dependency = %config.name,
            strategy = config.strategy.as_str(),
            endpoints = endpoints.len(),
            "Failover manager created"
        );
        Ok(Self {
            dependency: config.name.clone(),
            strategy: config.strategy,
            endpoints,
            active,
            pending_switch: AtomicBool::new(false),
        })
    }

    pub fn dependency(&self) -> &str {
        &self.dependency
    }

    pub fn strategy(&self) -> FailoverStrategy {
        self.strategy
    }

    pub fn endpoints(&self) -> &[Arc<Endpoint>] {
        &self.endpoints
    }

    pub fn endpoint_by_id(&self, id: &str) -> Option<Arc<Endpoint>> {
        self.endpoints.iter().find(|e| e.id() == id).cloned()
    }

    /// The endpoint traffic should use right now.
    ///
    /// Highest-priority healthy endpoint first; degraded endpoints only when
    /// nothing is healthy; as a last resort the least-recently-failed
    /// endpoint, flagged by its unhealthy state in the snapshot. Under the
    /// Immediate and Graceful strategies endpoints with a live failure streak
    /// rank behind clean ones, which is what keeps traffic off a just-failed
    /// endpoint until a success or probe clears its streak.
    pub fn select_endpoint(&self) -> Arc<Endpoint> {
        if self.pending_switch.load(Ordering::Acquire) {
            let pinned = self.active.load_full();
            if pinned.in_flight() > 0 {
                return pinned;
            }
            self.pending_switch.store(false, Ordering::Release);
            tracing::info!(
                dependency = %self.dependency,
                endpoint = %pinned.id(),
                "In-flight calls drained, completing deferred switch"
            );
        }

        let best = self.best_candidate(None);
        let current = self.active.load();
        if best.id() != current.id() {
            tracing::info!(
                dependency = %self.dependency,
                from = %current.id(),
                to = %best.id(),
                "Active endpoint changed"
            );
            self.active.store(best.clone());
        }
        best
    }

    /// Record a request-path success against `endpoint`.
    pub fn record_success(&self, endpoint: &Arc<Endpoint>) {
        endpoint.mark_success(None);
    }

    /// Record a request-path failure against `endpoint` and apply the
    /// strategy's switching rule.
    pub fn record_failure(&self, endpoint: &Arc<Endpoint>) {
        endpoint.mark_failure();

        match self.strategy {
            FailoverStrategy::Immediate => {
                if self.active.load().id() == endpoint.id() {
                    let next = self.best_candidate(Some(endpoint.id()));
                    if next.id() != endpoint.id() {
                        tracing::warn!(
                            dependency = %self.dependency,
                            from = %endpoint.id(),
                            to = %next.id(),
                            "Failing over immediately"
                        );
                        self.active.store(next);
                    }
                }
            }
            FailoverStrategy::Graceful => {
                if self.active.load().id() == endpoint.id() {
                    self.pending_switch.store(true, Ordering::Release);
                    tracing::info!(
                        dependency = %self.dependency,
                        endpoint = %endpoint.id(),
                        in_flight = endpoint.in_flight(),
                        "Deferring failover until in-flight calls drain"
                    );
                }
            }
            // The executor drives switching explicitly for these.
            FailoverStrategy::RetryThenFailover | FailoverStrategy::Cascade => {}
        }
    }

    /// Switch away from `endpoint` after its retry budget is spent.
    ///
    /// Returns the new active endpoint, which is `endpoint` itself when no
    /// alternative exists.
    pub fn advance_from(&self, endpoint: &Arc<Endpoint>) -> Arc<Endpoint> {
        let next = self.best_candidate(Some(endpoint.id()));
        if next.id() != endpoint.id() {
            tracing::warn!(
                dependency = %self.dependency,
                from = %endpoint.id(),
                to = %next.id(),
                "Retry budget spent, failing over"
            );
            self.active.store(next.clone());
        }
        next
    }

    /// Endpoints in the order a cascade should try them: selectable ones by
    /// priority, or every endpoint when all are unhealthy.
    pub fn cascade_order(&self) -> Vec<Arc<Endpoint>> {
        let selectable: Vec<Arc<Endpoint>> = self
            .endpoints
            .iter()
            .filter(|e| e.is_selectable())
            .cloned()
            .collect();
        if selectable.is_empty() {
            self.endpoints.to_vec()
        } else {
            selectable
        }
    }

    fn best_candidate(&self, exclude: Option<&str>) -> Arc<Endpoint> {
        let eligible =
            |e: &&Arc<Endpoint>| exclude.map_or(true, |excluded| e.id() != excluded);
        let switch_on_failure = matches!(
            self.strategy,
            FailoverStrategy::Immediate | FailoverStrategy::Graceful
        );

        // Under failure-switching strategies, healthy endpoints without a
        // failure streak win by priority.
        if switch_on_failure {
            if let Some(e) = self.endpoints.iter().filter(eligible).find(|e| {
                e.health() == EndpointHealth::Healthy && e.consecutive_failures() == 0
            }) {
                return e.clone();
            }
        }
        // Any healthy endpoint, by priority.
        if let Some(e) = self
            .endpoints
            .iter()
            .filter(eligible)
            .find(|e| e.health() == EndpointHealth::Healthy)
        {
            return e.clone();
        }
        // Then degraded, best-effort.
        if let Some(e) = self
            .endpoints
            .iter()
            .filter(eligible)
            .find(|e| e.health() == EndpointHealth::Degraded)
        {
            return e.clone();
        }
        // Everything is down: least-recently-failed, ignoring the exclusion
        // when it is the only endpoint left.
        self.endpoints
            .iter()
            .filter(eligible)
            .min_by_key(|e| e.last_failed_at_ms())
            .unwrap_or(&self.endpoints[0])
            .clone()
    }

    pub fn snapshot(&self) -> DependencySnapshot {
        DependencySnapshot {
            dependency: self.dependency.clone(),
            strategy: self.strategy,
            active_endpoint: self.active.load().id().to_string(),
            endpoints: self.endpoints.iter().map(|e| e.snapshot()).collect(),
        }
    }
}
