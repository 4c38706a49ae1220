//! Safe multisig coordinator library.

pub mod admin;
pub mod blockchain;
pub mod config;
pub mod execution;
pub mod lifecycle;
pub mod notifications;
pub mod observability;
pub mod reconciler;
pub mod resilience;
pub mod store;

pub use config::schema::CoordinatorConfig;
pub use execution::TransactionSubmitter;
pub use lifecycle::Shutdown;
pub use reconciler::ReconciliationEngine;
