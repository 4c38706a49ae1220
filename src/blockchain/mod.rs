//! Blockchain integration subsystem.
//!
//! # Data Flow
//! ```text
//! Environment Variables (executor key, RPC/WS URLs)
//!     → wallet.rs (key loading, signing, local nonce)
//!     → client.rs (RPC with timeouts, failover, retry; implements gateway.rs)
//!     → transaction.rs (price, build, sign legacy tx)
//! ```
//!
//! Everything above the chain talks to [`ChainGateway`], never to alloy
//! providers directly.
//!
//! # Security Constraints
//! - Private keys ONLY from environment variables
//! - Never log private keys or sensitive data
//! - All RPC calls have configurable timeouts

pub mod client;
pub mod contracts;
pub mod gateway;
pub mod transaction;
pub mod types;
pub mod wallet;

pub use client::BlockchainClient;
pub use gateway::{ChainGateway, LogStream};
pub use transaction::{SignedTx, TxBuilder};
pub use types::{BlockchainConfig, BlockchainError, BlockchainResult, ChainId, ChainLog, ChainReceipt};
pub use wallet::Wallet;
