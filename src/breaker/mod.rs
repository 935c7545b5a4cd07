//! Circuit breaking subsystem.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls fail fast
//! - Half-Open: limited trial calls test recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive qualifying failures >= failure_threshold
//! Open → Half-Open: reset timeout elapsed, checked lazily on allow()
//! Half-Open → Closed: success_threshold consecutive successes
//! Half-Open → Open: any qualifying failure among trial calls
//! ```
//!
//! # Design Decisions
//! - One breaker per dependency name, created lazily through the registry
//! - No background timer; Open → Half-Open happens on the next allow()
//! - Only classifier-qualified errors count toward opening
//! - Counters reset on every transition

pub mod circuit_breaker;
pub mod registry;

pub use circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitState};
pub use registry::BreakerRegistry;
