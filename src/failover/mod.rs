//! Failover subsystem.
//!
//! # Data Flow
//! ```text
//! Executor asks for an endpoint:
//!     → manager.rs (highest-priority healthy, degraded as best-effort)
//!
//! Attempt outcome recorded:
//!     → endpoint.rs (hysteresis counters, health transitions)
//!     → manager.rs (strategy decides whether the active endpoint moves)
//!
//! Health probes feed the same endpoint state from their own timers
//! ```
//!
//! # Design Decisions
//! - Endpoint health is atomics-only; selection never takes a lock
//! - The active endpoint is a lock-free swapped pointer
//! - Equal priorities keep registration order (stable sort)
//! - An unhealthy endpoint rejoins selection only after probe successes

pub mod endpoint;
pub mod manager;

pub use endpoint::{CallGuard, Endpoint, EndpointHealth, EndpointSnapshot};
pub use manager::{DependencySnapshot, FailoverManager, FailoverStrategy};
