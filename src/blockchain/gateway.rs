//! The chain-facing seam of the engine.
//!
//! Every reconciler loop and the submitter talk to the chain through
//! [`ChainGateway`]; [`BlockchainClient`](crate::blockchain::BlockchainClient)
//! is the production implementation.

use alloy::primitives::{Address, Bytes, TxHash};
use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::blockchain::types::{BlockchainResult, ChainLog, ChainReceipt};

/// Push stream of factory creation logs. Ends when the subscription dies.
pub type LogStream = BoxStream<'static, ChainLog>;

#[async_trait]
pub trait ChainGateway: Send + Sync {
    async fn chain_id(&self) -> BlockchainResult<u64>;

    async fn block_number(&self) -> BlockchainResult<u64>;

    /// `Ok(None)` while the transaction is not mined.
    async fn receipt(&self, tx_hash: TxHash) -> BlockchainResult<Option<ChainReceipt>>;

    /// Subscribe to `ProxyCreation` logs emitted by `factory`, from now on.
    async fn subscribe_creation_logs(&self, factory: Address) -> BlockchainResult<LogStream>;

    /// The Safe's replay-protection nonce.
    async fn safe_nonce(&self, safe: Address) -> BlockchainResult<u64>;

    /// Current Safe owners, in linked-list order.
    async fn safe_owners(&self, safe: Address) -> BlockchainResult<Vec<Address>>;

    /// Transaction count of an externally owned account.
    async fn account_nonce(&self, address: Address) -> BlockchainResult<u64>;

    /// Suggested gas price in wei.
    async fn gas_price(&self) -> BlockchainResult<u128>;

    /// Broadcast a signed, EIP-2718 encoded transaction.
    async fn send_raw_transaction(&self, raw: Bytes) -> BlockchainResult<TxHash>;
}
