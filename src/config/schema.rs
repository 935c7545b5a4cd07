//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the engine.
//! All types derive Serde traits for deserialization from config files.

use crate::cache::entry::Priority;
use crate::cache::store::EvictionPolicy;
use crate::failover::manager::FailoverStrategy;
use crate::retry::policy::BackoffStrategy;
use serde::{Deserialize, Serialize};

/// Root configuration for the execution engine.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Cache settings (budgets, TTL, eviction).
    pub cache: CacheConfig,

    /// Circuit breaker thresholds, applied to every lazily created breaker.
    pub breaker: BreakerConfig,

    /// Retry schedule and attempt budget.
    pub retry: RetryConfig,

    /// Health probe defaults.
    pub health_check: HealthCheckConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Dependency definitions with their ranked endpoints.
    pub dependencies: Vec<DependencyConfig>,
}

/// Cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entry lifetime in milliseconds when a set does not specify one.
    pub default_ttl_ms: u64,

    /// Maximum number of entries.
    pub max_entries: usize,

    /// Maximum total approximate bytes.
    pub max_bytes: usize,

    /// Victim selection rule when over budget.
    pub eviction_policy: EvictionPolicy,

    /// Priority assigned to entries that do not specify one.
    pub default_priority: Priority,

    /// Interval of the background expiry sweep in milliseconds.
    pub sweep_interval_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: 60_000,
            max_entries: 10_000,
            max_bytes: 64 * 1024 * 1024,
            eviction_policy: EvictionPolicy::Lru,
            default_priority: Priority::Medium,
            sweep_interval_ms: 30_000,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive qualifying failures before the circuit opens.
    pub failure_threshold: u32,

    /// Consecutive successes in half-open before the circuit closes.
    pub success_threshold: u32,

    /// Cooldown before an open circuit admits a trial call, in milliseconds.
    pub reset_timeout_ms: u64,

    /// Maximum concurrent trial calls while half-open.
    pub half_open_max_calls: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout_ms: 30_000,
            half_open_max_calls: 2,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts per logical call.
    pub max_attempts: u32,

    /// Backoff schedule shape.
    pub strategy: BackoffStrategy,

    /// Base delay for backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            strategy: BackoffStrategy::Exponential,
            base_delay_ms: 100,
            max_delay_ms: 2_000,
        }
    }
}

/// Health probe defaults, applied to probes registered without overrides.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable probe scheduling. Registration is a no-op when false.
    pub enabled: bool,

    /// Probe interval in milliseconds.
    pub interval_ms: u64,

    /// Probe timeout in milliseconds; expiry counts as a failed probe.
    pub timeout_ms: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 10_000,
            timeout_ms: 5_000,
        }
    }
}

/// Timeout configuration for wrapped calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Per-attempt timeout in milliseconds.
    pub attempt_ms: u64,

    /// Overall operation deadline in milliseconds, bounding all attempts
    /// plus backoff sleeps.
    pub operation_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            attempt_ms: 5_000,
            operation_ms: 30_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// A dependency with its ranked endpoints.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DependencyConfig {
    /// Unique dependency name; keys the breaker and the failover table.
    pub name: String,

    /// How traffic escalates across endpoints on failure.
    #[serde(default = "default_strategy")]
    pub strategy: FailoverStrategy,

    /// Consecutive failures before an endpoint is marked unhealthy.
    #[serde(default = "default_unhealthy_threshold")]
    pub unhealthy_threshold: u32,

    /// Consecutive successes before an unhealthy endpoint recovers.
    #[serde(default = "default_healthy_threshold")]
    pub healthy_threshold: u32,

    /// Probe latency above which a responding endpoint counts as degraded.
    #[serde(default = "default_degraded_after_ms")]
    pub degraded_after_ms: u64,

    /// Ranked endpoints. Lower priority is preferred.
    pub endpoints: Vec<EndpointConfig>,
}

fn default_strategy() -> FailoverStrategy {
    FailoverStrategy::RetryThenFailover
}

fn default_unhealthy_threshold() -> u32 {
    3
}

fn default_healthy_threshold() -> u32 {
    2
}

fn default_degraded_after_ms() -> u64 {
    1_000
}

/// A single endpoint of a dependency.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointConfig {
    /// Unique endpoint identifier within the dependency.
    pub id: String,

    /// Endpoint URL (e.g., "https://store-primary.internal:5432").
    pub url: String,

    /// Rank; lower is preferred. Ties keep registration order.
    #[serde(default)]
    pub priority: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_production_shaped() {
        let config = EngineConfig::default();
        assert_eq!(config.cache.eviction_policy, EvictionPolicy::Lru);
        assert!(config.cache.max_entries > 0);
        assert_eq!(config.breaker.failure_threshold, 5);
        assert_eq!(config.retry.strategy, BackoffStrategy::Exponential);
        assert!(config.health_check.enabled);
        assert!(config.dependencies.is_empty());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = EngineConfig::default();
        let toml = toml::to_string(&config).unwrap();
        let parsed: EngineConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.cache.max_bytes, config.cache.max_bytes);
        assert_eq!(parsed.timeouts.attempt_ms, config.timeouts.attempt_ms);
    }

    #[test]
    fn test_parse_dependency_block() {
        let toml = r#"
            [retry]
            max_attempts = 5
            strategy = "jittered"

            [[dependencies]]
            name = "market-data"
            strategy = "cascade"

            [[dependencies.endpoints]]
            id = "primary"
            url = "https://md-1.internal:9000"

            [[dependencies.endpoints]]
            id = "secondary"
            url = "https://md-2.internal:9000"
            priority = 1
        "#;
        let config: EngineConfig = toml::from_str(toml).unwrap();

        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.strategy, BackoffStrategy::Jittered);

        let dep = &config.dependencies[0];
        assert_eq!(dep.name, "market-data");
        assert_eq!(dep.strategy, FailoverStrategy::Cascade);
        assert_eq!(dep.unhealthy_threshold, 3);
        assert_eq!(dep.endpoints.len(), 2);
        assert_eq!(dep.endpoints[0].priority, 0);
        assert_eq!(dep.endpoints[1].priority, 1);
    }
}
