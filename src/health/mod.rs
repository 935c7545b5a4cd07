//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Per-check timer (scheduler.rs):
//!     tick → probe with timeout
//!     → endpoint health state (hysteresis thresholds)
//!     → dependency circuit breaker (record_success / record_failure)
//!     → last-result snapshot for the summary
//!
//! Request-path failures feed the same endpoint state passively
//! through the failover manager
//! ```
//!
//! # Design Decisions
//! - Probes run on independent timers and never block the request path
//! - A probe exceeding its timeout counts as a failure
//! - Probe starts are splayed so co-registered checks do not align
//! - Every probe task exits on the shutdown broadcast

pub mod scheduler;

pub use scheduler::{HealthCheck, HealthCheckScheduler, ProbeFn, ProbeResult};
