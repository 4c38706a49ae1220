//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured fields (tx_hash, safe, proposal_id) on every engine event
//! - Metric updates are fire-and-forget; no exporter means no-ops

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
