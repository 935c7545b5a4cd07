//! Caching subsystem.
//!
//! # Data Flow
//! ```text
//! get(key):
//!     → entry.rs (TTL check; expired entries are misses)
//!     → store.rs (recency/frequency bookkeeping)
//!
//! set(key, value):
//!     → store.rs (size accounting, eviction before insert)
//!
//! get_or_compute(key, fn):
//!     → singleflight.rs (one compute per key; late arrivals wait)
//!     → store.rs (result cached for everyone)
//!
//! sweeper.rs: periodic timer removes expired entries even without reads
//! ```
//!
//! # Design Decisions
//! - Reads and writes go through sharded map buckets; unrelated keys never wait
//!   on each other
//! - Eviction victim selection is serialized per store
//! - An entry larger than the whole byte budget is rejected, not an error

pub mod entry;
pub mod singleflight;
pub mod store;
pub mod sweeper;

pub use entry::{CacheEntry, Priority, SetOptions};
pub use store::{CacheStats, EvictionPolicy, TieredCache};
pub use sweeper::Sweeper;
