//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     trigger() → broadcast to every background task
//!     → cache sweeper exits loop
//!     → health probe tasks exit loops
//! ```
//!
//! # Design Decisions
//! - Background timers subscribe at spawn time; stopping them is provable,
//!   not dependent on process exit
//! - Trigger is idempotent

pub mod shutdown;

pub use shutdown::Shutdown;
