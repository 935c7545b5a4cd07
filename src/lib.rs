//! Resilient-operation execution engine.
//!
//! Wraps calls to unreliable external dependencies (data store, inference
//! service, market-data feed) with caching, circuit breaking, retry, failover
//! across ranked endpoints, and continuous health probing.
//!
//! # Architecture Overview
//!
//! ```text
//! caller
//!   → executor (composition root)
//!       → cache (hit? return without touching anything else)
//!       → breaker (open? fail fast / fallback)
//!       → failover (pick active endpoint by priority + health)
//!       → retry loop around the wrapped call (per-attempt timeout)
//!       → record outcome to breaker + endpoint + cache + metrics
//!   ← value | terminal structured error | fallback value
//!
//! health probes run on independent timers and feed
//! endpoint health + breaker state, never the request path
//! ```

pub mod errors;

// Core subsystems
pub mod breaker;
pub mod cache;
pub mod executor;
pub mod failover;
pub mod retry;

// Traffic management
pub mod health;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use config::schema::EngineConfig;
pub use errors::{DependencyError, ErrorKind, ExecutionError};
pub use executor::{ExecuteOptions, ResilientExecutor};
pub use lifecycle::Shutdown;
