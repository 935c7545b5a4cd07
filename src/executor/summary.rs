//! Point-in-time engine summary for external monitoring.

use crate::breaker::circuit_breaker::BreakerSnapshot;
use crate::cache::store::CacheStats;
use crate::failover::manager::DependencySnapshot;
use crate::health::scheduler::ProbeResult;
use serde::Serialize;

/// Executor-level counters since startup.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ExecutorCounters {
    /// Attempts beyond the first, across all calls.
    pub retries: u64,
    /// Times a call escalated to a different endpoint.
    pub failovers: u64,
    /// Fallback values served instead of terminal errors.
    pub fallbacks: u64,
}

/// Snapshot of every subsystem, serializable for an external monitoring
/// surface.
#[derive(Debug, Clone, Serialize)]
pub struct EngineSummary {
    pub cache: CacheStats,
    pub breakers: Vec<BreakerSnapshot>,
    pub dependencies: Vec<DependencySnapshot>,
    pub probes: Vec<ProbeResult>,
    pub counters: ExecutorCounters,
}
