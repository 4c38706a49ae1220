//! Outer transaction building and signing.
//!
//! # Responsibilities
//! - Sync the executor nonce with the chain
//! - Price gas with the configured multiplier and ceiling
//! - Build, sign and encode a legacy transaction ready for broadcast

use alloy::eips::eip2718::Encodable2718;
use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::rpc::types::TransactionRequest;
use std::sync::Arc;

use crate::blockchain::client::wei_to_gwei;
use crate::blockchain::gateway::ChainGateway;
use crate::blockchain::types::{BlockchainConfig, BlockchainError, BlockchainResult};
use crate::blockchain::wallet::Wallet;

/// A signed transaction, encoded for `eth_sendRawTransaction`.
#[derive(Debug, Clone)]
pub struct SignedTx {
    pub raw: Bytes,
    pub nonce: u64,
    pub gas_price: u128,
}

/// Transaction builder for executor-paid calls.
#[derive(Clone)]
pub struct TxBuilder {
    chain: Arc<dyn ChainGateway>,
    wallet: Wallet,
    gas_price_multiplier: f64,
    max_gas_price_gwei: u64,
}

impl TxBuilder {
    pub fn new(chain: Arc<dyn ChainGateway>, wallet: Wallet, config: &BlockchainConfig) -> Self {
        Self {
            chain,
            wallet,
            gas_price_multiplier: config.gas_price_multiplier,
            max_gas_price_gwei: config.max_gas_price_gwei,
        }
    }

    /// Build and sign a legacy call to `to` with zero value and a fixed gas limit.
    pub async fn build_signed(&self, to: Address, data: Bytes, gas_limit: u64) -> BlockchainResult<SignedTx> {
        // Price first: a refused price must not reserve a nonce
        let network_price = self.chain.gas_price().await?;
        let gas_price = adjust_gas_price(network_price, self.gas_price_multiplier, self.max_gas_price_gwei)?;

        // Get current nonce from chain and reconcile with what we already sent
        let chain_nonce = self.chain.account_nonce(self.wallet.address()).await?;
        let nonce = self.wallet.reserve_nonce(chain_nonce);

        let request = TransactionRequest::default()
            .with_from(self.wallet.address())
            .with_to(to)
            .with_value(U256::ZERO)
            .with_input(data)
            .with_nonce(nonce)
            .with_gas_price(gas_price)
            .with_chain_id(self.wallet.chain_id())
            .with_gas_limit(gas_limit);

        let envelope = request
            .build(&self.wallet.network_wallet())
            .await
            .map_err(|e| BlockchainError::Wallet(format!("Failed to sign transaction: {}", e)))?;

        tracing::debug!(
            to = %to,
            nonce,
            gas_price_gwei = wei_to_gwei(gas_price),
            gas_limit,
            "Transaction signed"
        );

        Ok(SignedTx {
            raw: Bytes::from(envelope.encoded_2718()),
            nonce,
            gas_price,
        })
    }

    /// Sign and broadcast in one step.
    pub async fn send(&self, to: Address, data: Bytes, gas_limit: u64) -> BlockchainResult<TxHash> {
        let signed = self.build_signed(to, data, gas_limit).await?;
        match self.chain.send_raw_transaction(signed.raw).await {
            Ok(hash) => Ok(hash),
            Err(e) => {
                // Never consumed on-chain; give it back unless a later build holds a newer one.
                if !self.wallet.release_nonce(signed.nonce) {
                    tracing::warn!(nonce = signed.nonce, "Nonce gap left after failed broadcast");
                }
                Err(e)
            }
        }
    }

    /// Get the wallet address.
    pub fn address(&self) -> Address {
        self.wallet.address()
    }
}

/// Apply the safety multiplier, refusing prices above the ceiling.
pub fn adjust_gas_price(network_price: u128, multiplier: f64, max_gwei: u64) -> BlockchainResult<u128> {
    let adjusted = (network_price as f64 * multiplier) as u128;
    let adjusted_gwei = wei_to_gwei(adjusted);
    if adjusted_gwei > max_gwei {
        return Err(BlockchainError::GasPriceTooHigh {
            current_gwei: adjusted_gwei,
            max_gwei,
        });
    }
    Ok(adjusted)
}
