//! Named breaker registry.

use crate::breaker::circuit_breaker::{BreakerSnapshot, CircuitBreaker};
use crate::config::schema::BreakerConfig;
use crate::errors::ErrorClassifier;
use dashmap::DashMap;
use std::sync::Arc;

/// Registry of circuit breakers, one per dependency name.
///
/// Breakers are created lazily on first use and live for the process. The
/// registry is an explicit object owned by the executor, never ambient state.
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    config: BreakerConfig,
    classifier: Arc<dyn ErrorClassifier>,
}

impl BreakerRegistry {
    pub fn new(config: BreakerConfig, classifier: Arc<dyn ErrorClassifier>) -> Self {
        Self {
            breakers: DashMap::new(),
            config,
            classifier,
        }
    }

    /// Fetch the breaker for `name`, creating it on first use.
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    name.to_string(),
                    &self.config,
                    self.classifier.clone(),
                ))
            })
            .clone()
    }

    /// Snapshot every breaker, sorted by name for stable output.
    pub fn snapshot_all(&self) -> Vec<BreakerSnapshot> {
        let mut snapshots: Vec<BreakerSnapshot> = self
            .breakers
            .iter()
            .map(|r| r.value().snapshot())
            .collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}
