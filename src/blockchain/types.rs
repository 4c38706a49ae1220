//! Chain-specific types and error definitions.

use alloy::primitives::{Address, Bytes, TxHash, B256};
use alloy::rpc::types::{Log, TransactionReceipt};
use alloy::rpc::json_rpc::RpcError;
use alloy::transports::TransportError;
use thiserror::Error;

use crate::resilience::{ErrorKind, Retryable};

pub use crate::config::schema::BlockchainConfig;

/// Chain ID type for strong typing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainId(pub u64);

impl From<u64> for ChainId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<ChainId> for u64 {
    fn from(id: ChainId) -> Self {
        id.0
    }
}

/// Errors that can occur during blockchain operations.
#[derive(Debug, Error)]
pub enum BlockchainError {
    /// Connection-level failure talking to the RPC endpoint.
    #[error("RPC transport error: {0}")]
    Transport(String),

    /// RPC request timed out.
    #[error("RPC timeout after {0} seconds")]
    Timeout(u64),

    /// Error response the node may not repeat (rate limit, stale state).
    #[error("RPC error (retryable): {0}")]
    RpcRetryable(String),

    /// Error response from the node.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// A call returned data that could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Log subscription could not be opened or was closed.
    #[error("Subscription error: {0}")]
    Subscription(String),

    /// Invalid private key format or signing error.
    #[error("Wallet error: {0}")]
    Wallet(String),

    /// Gas price exceeded maximum allowed.
    #[error("Gas price {current_gwei} gwei exceeds maximum {max_gwei} gwei")]
    GasPriceTooHigh { current_gwei: u64, max_gwei: u64 },

    /// Chain configuration mismatch.
    #[error("Chain ID mismatch: expected {expected}, got {actual}")]
    ChainMismatch { expected: u64, actual: u64 },
}

impl BlockchainError {
    /// Classify an alloy transport error.
    ///
    /// JSON-RPC error responses are matched against `retryable` substrings
    /// here, once, so callers only ever look at [`ErrorKind`].
    pub fn classify(err: TransportError, retryable: &[String]) -> Self {
        match err {
            RpcError::Transport(kind) => Self::Transport(kind.to_string()),
            RpcError::ErrorResp(payload) => {
                let message = payload.message.to_string();
                let lowered = message.to_lowercase();
                if retryable.iter().any(|needle| lowered.contains(&needle.to_lowercase())) {
                    Self::RpcRetryable(message)
                } else {
                    Self::Rpc(message)
                }
            }
            RpcError::NullResp => Self::RpcRetryable("null response".to_string()),
            other => Self::Rpc(other.to_string()),
        }
    }
}

impl Retryable for BlockchainError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) | Self::Timeout(_) | Self::RpcRetryable(_) => ErrorKind::Transient,
            Self::Subscription(_) => ErrorKind::Transient,
            Self::Rpc(_)
            | Self::Decode(_)
            | Self::Wallet(_)
            | Self::GasPriceTooHigh { .. }
            | Self::ChainMismatch { .. } => ErrorKind::Permanent,
        }
    }
}

/// Result type for blockchain operations.
pub type BlockchainResult<T> = Result<T, BlockchainError>;

/// An event log as seen by the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChainLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: Option<u64>,
    pub tx_hash: Option<TxHash>,
    pub tx_index: Option<u64>,
    pub block_hash: Option<B256>,
    pub log_index: Option<u64>,
    pub removed: bool,
}

impl From<&Log> for ChainLog {
    fn from(log: &Log) -> Self {
        Self {
            address: log.inner.address,
            topics: log.inner.data.topics().to_vec(),
            data: log.inner.data.data.clone(),
            block_number: log.block_number,
            tx_hash: log.transaction_hash,
            tx_index: log.transaction_index,
            block_hash: log.block_hash,
            log_index: log.log_index,
            removed: log.removed,
        }
    }
}

/// The parts of a transaction receipt the reconciler needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainReceipt {
    /// Whether execution succeeded.
    pub status: bool,
    pub block_number: u64,
    pub gas_used: u64,
    pub logs: Vec<ChainLog>,
}

impl From<&TransactionReceipt> for ChainReceipt {
    fn from(receipt: &TransactionReceipt) -> Self {
        Self {
            status: receipt.status(),
            block_number: receipt.block_number.unwrap_or_default(),
            gas_used: receipt.gas_used,
            logs: receipt.inner.logs().iter().map(ChainLog::from).collect(),
        }
    }
}
