//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to the chain:
//!     → blockchain::client (per-call timeout, provider failover)
//!     → On failure: error classified into ErrorKind
//!     → retries.rs (retry Transient kinds with backoff.rs delays)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Retry decisions read a typed kind, never error text
//! - Retry sleeps end early on shutdown

pub mod backoff;
pub mod retries;

pub use backoff::Backoff;
pub use retries::{ErrorKind, RetryError, RetryPolicy, Retryable};
