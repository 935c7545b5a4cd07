//! Configuration subsystem.
//!
//! # Data Flow
//! ```text
//! TOML file
//!     → loader.rs (read + parse)
//!     → validation.rs (semantic checks, all errors collected)
//!     → schema.rs types consumed by every subsystem
//! ```
//!
//! # Design Decisions
//! - Every struct has production-shaped defaults; an empty file is a valid config
//! - The endpoint set is fixed at startup; there is no hot reload
//! - Validation failures name the offending field by dotted path

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::EngineConfig;
pub use validation::{validate_config, ValidationError};
