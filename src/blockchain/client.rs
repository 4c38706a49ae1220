//! Blockchain RPC client with timeout, failover and retry.
//!
//! # Responsibilities
//! - Connect to JSON-RPC endpoints (primary + failovers) and a WebSocket endpoint
//! - Query chain state (block number, receipts, Safe nonce and owners)
//! - Broadcast signed transactions
//! - Classify every failure into a typed error and retry transient ones

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, TxHash};
use alloy::providers::{Provider, ProviderBuilder, WsConnect};
use alloy::rpc::types::eth::Filter;
use alloy::rpc::types::TransactionRequest;
use alloy::sol_types::SolCall;
use alloy::transports::TransportResult;
use async_trait::async_trait;
use futures_util::StreamExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::blockchain::contracts::{ISafe, PROXY_CREATION_TOPIC};
use crate::blockchain::gateway::{ChainGateway, LogStream};
use crate::blockchain::types::{
    BlockchainConfig, BlockchainError, BlockchainResult, ChainId, ChainLog, ChainReceipt,
};
use crate::resilience::RetryPolicy;

type DynProvider = Arc<dyn Provider + Send + Sync>;

/// Blockchain RPC client wrapper with failover support.
#[derive(Clone)]
pub struct BlockchainClient {
    /// List of providers (primary + failovers).
    providers: Vec<DynProvider>,
    config: BlockchainConfig,
    timeout_duration: Duration,
    retry: RetryPolicy,
}

impl BlockchainClient {
    /// Create a new blockchain client.
    ///
    /// Does not touch the network; startup compares [`ChainGateway::chain_id`]
    /// against configuration before anything else runs.
    pub fn new(config: BlockchainConfig, retry: RetryPolicy) -> BlockchainResult<Self> {
        let timeout_duration = Duration::from_secs(config.rpc_timeout_secs);
        let mut providers = Vec::new();

        // 1. Add primary provider
        let primary_url: url::Url = config.rpc_url.parse().map_err(|e| {
            BlockchainError::Rpc(format!("Invalid RPC URL '{}': {}", config.rpc_url, e))
        })?;
        providers.push(Arc::new(ProviderBuilder::new().connect_http(primary_url)) as DynProvider);

        // 2. Add failover providers
        for url_str in &config.failover_urls {
            if let Ok(url) = url_str.parse() {
                providers.push(Arc::new(ProviderBuilder::new().connect_http(url)) as DynProvider);
            } else {
                tracing::warn!(url = %url_str, "Ignoring invalid failover RPC URL");
            }
        }

        tracing::info!(
            rpc_url = %config.rpc_url,
            failovers = providers.len() - 1,
            chain_id = config.chain_id,
            "Blockchain client initialized"
        );

        Ok(Self {
            providers,
            config,
            timeout_duration,
            retry,
        })
    }

    /// Get the chain ID from the RPC.
    pub async fn get_chain_id(&self) -> BlockchainResult<ChainId> {
        self.call("get_chain_id", |p| async move { p.get_chain_id().await })
            .await
            .map(ChainId)
    }

    /// Run `f` against each provider in turn until one answers, retrying the
    /// whole sweep on transient failures.
    async fn call<T, F, Fut>(&self, op: &'static str, f: F) -> BlockchainResult<T>
    where
        F: Fn(DynProvider) -> Fut,
        Fut: Future<Output = TransportResult<T>>,
    {
        self.retry
            .run(op, || self.sweep(op, &f))
            .await
            .map_err(|e| e.into_last_error())
    }

    async fn sweep<T, F, Fut>(&self, op: &'static str, f: &F) -> BlockchainResult<T>
    where
        F: Fn(DynProvider) -> Fut,
        Fut: Future<Output = TransportResult<T>>,
    {
        let mut last_error = None;
        for (i, provider) in self.providers.iter().enumerate() {
            match timeout(self.timeout_duration, f(provider.clone())).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) => {
                    let err = BlockchainError::classify(e, &self.config.retryable_errors);
                    tracing::warn!(op, provider_idx = i, error = %err, "RPC error, trying next provider");
                    last_error = Some(err);
                }
                Err(_) => {
                    tracing::warn!(op, provider_idx = i, "RPC timeout, trying next provider");
                    last_error = Some(BlockchainError::Timeout(self.config.rpc_timeout_secs));
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| BlockchainError::Transport("no RPC providers configured".to_string())))
    }

    async fn eth_call(&self, op: &'static str, to: Address, data: Vec<u8>) -> BlockchainResult<Bytes> {
        let request = TransactionRequest::default()
            .with_to(to)
            .with_input(data);
        self.call(op, move |p| {
            let request = request.clone();
            async move { p.call(request).await }
        })
        .await
    }
}

#[async_trait]
impl ChainGateway for BlockchainClient {
    async fn chain_id(&self) -> BlockchainResult<u64> {
        self.get_chain_id().await.map(u64::from)
    }

    async fn block_number(&self) -> BlockchainResult<u64> {
        self.call("get_block_number", |p| async move { p.get_block_number().await })
            .await
    }

    async fn receipt(&self, tx_hash: TxHash) -> BlockchainResult<Option<ChainReceipt>> {
        let receipt = self
            .call("get_transaction_receipt", move |p| async move {
                p.get_transaction_receipt(tx_hash).await
            })
            .await?;
        Ok(receipt.as_ref().map(ChainReceipt::from))
    }

    async fn subscribe_creation_logs(&self, factory: Address) -> BlockchainResult<LogStream> {
        let ws = WsConnect::new(self.config.ws_url.clone());
        let provider = timeout(self.timeout_duration, ProviderBuilder::new().connect_ws(ws))
            .await
            .map_err(|_| BlockchainError::Timeout(self.config.rpc_timeout_secs))?
            .map_err(|e| BlockchainError::Subscription(e.to_string()))?;

        let filter = Filter::new()
            .address(factory)
            .event_signature(PROXY_CREATION_TOPIC);
        let subscription = provider
            .subscribe_logs(&filter)
            .await
            .map_err(|e| BlockchainError::Subscription(e.to_string()))?;

        tracing::info!(ws_url = %self.config.ws_url, factory = %factory, "Log subscription opened");

        // The provider owns the socket; keep it alive for as long as the stream.
        let stream = subscription.into_stream().map(move |log| {
            let _connection = &provider;
            ChainLog::from(&log)
        });
        Ok(stream.boxed())
    }

    async fn safe_nonce(&self, safe: Address) -> BlockchainResult<u64> {
        let data = ISafe::nonceCall {}.abi_encode();
        let ret = self.eth_call("safe_nonce", safe, data).await?;
        let nonce = ISafe::nonceCall::abi_decode_returns(&ret)
            .map_err(|e| BlockchainError::Decode(format!("nonce(): {e}")))?;
        u64::try_from(nonce)
            .map_err(|_| BlockchainError::Decode(format!("nonce() out of range: {nonce}")))
    }

    async fn safe_owners(&self, safe: Address) -> BlockchainResult<Vec<Address>> {
        let data = ISafe::getOwnersCall {}.abi_encode();
        let ret = self.eth_call("safe_owners", safe, data).await?;
        ISafe::getOwnersCall::abi_decode_returns(&ret)
            .map_err(|e| BlockchainError::Decode(format!("getOwners(): {e}")))
    }

    async fn account_nonce(&self, address: Address) -> BlockchainResult<u64> {
        self.call("get_transaction_count", move |p| async move {
            p.get_transaction_count(address).await
        })
        .await
    }

    async fn gas_price(&self) -> BlockchainResult<u128> {
        self.call("get_gas_price", |p| async move { p.get_gas_price().await })
            .await
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> BlockchainResult<TxHash> {
        // Sent once through the primary; the submitter owns resubmission.
        let provider = self.providers[0].clone();
        let pending = timeout(self.timeout_duration, provider.send_raw_transaction(&raw))
            .await
            .map_err(|_| BlockchainError::Timeout(self.config.rpc_timeout_secs))?
            .map_err(|e| BlockchainError::classify(e, &self.config.retryable_errors))?;
        Ok(*pending.tx_hash())
    }
}

impl std::fmt::Debug for BlockchainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockchainClient")
            .field("rpc_url", &self.config.rpc_url)
            .field("ws_url", &self.config.ws_url)
            .field("chain_id", &self.config.chain_id)
            .field("timeout_secs", &self.config.rpc_timeout_secs)
            .finish()
    }
}

/// Convert a wei amount to whole gwei, saturating.
pub fn wei_to_gwei(wei: u128) -> u64 {
    u64::try_from(wei / 1_000_000_000).unwrap_or(u64::MAX)
}
