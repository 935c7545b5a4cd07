//! Shared fixtures for the integration tests.

use resilience_core::config::schema::{DependencyConfig, EndpointConfig, EngineConfig};
use resilience_core::failover::FailoverStrategy;

/// Engine config with one dependency named "store", millisecond-scale
/// backoff, and probing off. Tests flip the knobs they exercise.
pub fn engine_config(strategy: FailoverStrategy, endpoints: &[(&str, u32)]) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 10;
    config.health_check.enabled = false;
    config.dependencies.push(DependencyConfig {
        name: "store".to_string(),
        strategy,
        unhealthy_threshold: 3,
        healthy_threshold: 1,
        degraded_after_ms: 1_000,
        endpoints: endpoints
            .iter()
            .map(|(id, priority)| EndpointConfig {
                id: id.to_string(),
                url: format!("https://{}.internal:5432", id),
                priority: *priority,
            })
            .collect(),
    });
    config
}
