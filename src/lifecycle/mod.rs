//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Connect chain → Verify chain id → Open store
//!     → Build sink → Spawn engine + admin server
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Loops exit → Subscriptions dropped → Store snapshot
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Fail fast: a chain id mismatch aborts startup
//! - One shutdown signal reaches every task and every retry sleep

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{Shutdown, ShutdownSignal};
pub use startup::{bootstrap, App, StartupError};
