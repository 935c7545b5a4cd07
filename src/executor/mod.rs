//! Execution subsystem: the composition root.
//!
//! # Data Flow
//! ```text
//! execute(options, operation):
//!     → cache (hit? return immediately)
//!     → breaker gate (open? CircuitOpen / fallback, operation never invoked)
//!     → failover manager (active endpoint by priority + health)
//!     → retry loop with per-attempt timeout and backoff
//!     → outcome recorded to breaker + endpoint + metrics
//!     → success stored into cache when a cache key was given
//!
//! get_cached_or_execute: the same pipeline behind the cache's per-key
//! coalescing, so concurrent identical reads make one dependency call
//! ```
//!
//! # Design Decisions
//! - Each logical call carries a UUID operation id through its log events
//! - The overall deadline bounds attempts plus backoff sleeps; backoff never
//!   sleeps past it
//! - A per-attempt timeout expiry counts as a qualifying failure
//! - Fallback is consulted for every terminal error, CircuitOpen included

pub mod engine;
pub mod options;
pub mod summary;

pub use engine::ResilientExecutor;
pub use options::{ExecuteOptions, FallbackFn};
pub use summary::{EngineSummary, ExecutorCounters};
