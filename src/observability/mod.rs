//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, file, remote)
//!     → Metrics endpoint (Prometheus scrape)
//!     → executor::summary() (point-in-time snapshot for callers)
//! ```
//!
//! # Design Decisions
//! - Metric updates are cheap; helpers are no-ops until an exporter is installed
//! - Operation ID flows through all log events for one logical call

pub mod logging;
pub mod metrics;
