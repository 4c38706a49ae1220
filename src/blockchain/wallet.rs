//! Executor key management and transaction signing.
//!
//! # Security
//! - Private keys are loaded ONLY from environment variables
//! - Keys are never logged or serialized

use alloy::network::EthereumWallet;
use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::blockchain::types::{BlockchainError, BlockchainResult};

/// Default environment variable name for the executor private key.
pub const PRIVATE_KEY_ENV_VAR: &str = "SAFE_EXECUTOR_PRIVATE_KEY";

/// The account that pays for and submits `execTransaction` calls.
#[derive(Debug, Clone)]
pub struct Wallet {
    signer: PrivateKeySigner,
    /// Next nonce this process intends to use; shared between clones.
    nonce: Arc<AtomicU64>,
    /// Chain ID for EIP-155 replay protection.
    chain_id: u64,
}

impl Wallet {
    /// Create a wallet from a hex-encoded private key string.
    ///
    /// Accepts the key with or without a `0x` prefix.
    pub fn from_private_key(private_key_hex: &str, chain_id: u64) -> BlockchainResult<Self> {
        let key_hex = private_key_hex.trim();
        let key_hex = key_hex.strip_prefix("0x").unwrap_or(key_hex);

        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| BlockchainError::Wallet(format!("Invalid private key format: {}", e)))?;
        let signer = signer.with_chain_id(Some(chain_id));

        tracing::info!(
            address = %signer.address(),
            chain_id = chain_id,
            "Executor wallet initialized"
        );

        Ok(Self {
            signer,
            nonce: Arc::new(AtomicU64::new(0)),
            chain_id,
        })
    }

    /// Load wallet from the environment variable `var`.
    pub fn from_env(var: &str, chain_id: u64) -> BlockchainResult<Self> {
        let private_key = std::env::var(var).map_err(|_| {
            BlockchainError::Wallet(format!("Environment variable {} not set", var))
        })?;

        Self::from_private_key(&private_key, chain_id)
    }

    /// Get the wallet's address.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Get the chain ID this wallet is configured for.
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Reserve the next nonce given the chain's view of the account.
    ///
    /// The chain count lags transactions this process has broadcast but which
    /// are not yet mined, so the larger of the two is used.
    pub fn reserve_nonce(&self, chain_nonce: u64) -> u64 {
        let previous = self
            .nonce
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |local| {
                Some(local.max(chain_nonce) + 1)
            })
            .unwrap_or(chain_nonce);
        previous.max(chain_nonce)
    }

    /// Hand back a reserved nonce that never reached the chain.
    ///
    /// Only rewinds when no later reservation was made; returns whether it did.
    pub fn release_nonce(&self, nonce: u64) -> bool {
        self.nonce
            .compare_exchange(nonce.saturating_add(1), nonce, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Force the local nonce, e.g. after a "nonce too low" rejection.
    pub fn set_nonce(&self, nonce: u64) {
        self.nonce.store(nonce, Ordering::SeqCst);
    }

    /// Get current nonce without incrementing.
    pub fn current_nonce(&self) -> u64 {
        self.nonce.load(Ordering::SeqCst)
    }

    /// Network wallet used to sign transaction requests.
    pub fn network_wallet(&self) -> EthereumWallet {
        EthereumWallet::from(self.signer.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known test private key (Anvil's first account)
    const TEST_PRIVATE_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_wallet_from_private_key() {
        let wallet = Wallet::from_private_key(TEST_PRIVATE_KEY, 1).unwrap();
        assert_eq!(
            wallet.address().to_string().to_lowercase(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
    }

    #[test]
    fn test_wallet_with_0x_prefix() {
        let wallet = Wallet::from_private_key(&format!("0x{}", TEST_PRIVATE_KEY), 1).unwrap();
        assert_eq!(
            wallet.address().to_string().to_lowercase(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
    }

    #[test]
    fn test_reserve_nonce_tracks_chain_and_local() {
        let wallet = Wallet::from_private_key(TEST_PRIVATE_KEY, 1).unwrap();

        // Chain ahead of us: adopt its nonce.
        assert_eq!(wallet.reserve_nonce(5), 5);
        // Chain has not seen our pending tx yet: keep counting locally.
        assert_eq!(wallet.reserve_nonce(5), 6);
        assert_eq!(wallet.current_nonce(), 7);

        wallet.set_nonce(0);
        assert_eq!(wallet.reserve_nonce(9), 9);
    }

    #[test]
    fn test_release_rewinds_only_the_latest_reservation() {
        let wallet = Wallet::from_private_key(TEST_PRIVATE_KEY, 1).unwrap();

        let first = wallet.reserve_nonce(0);
        assert!(wallet.release_nonce(first));
        assert_eq!(wallet.reserve_nonce(0), first);
    }

    #[test]
    fn test_release_does_not_reissue_a_concurrent_nonce() {
        let wallet = Wallet::from_private_key(TEST_PRIVATE_KEY, 1).unwrap();

        let a = wallet.reserve_nonce(0);
        let b = wallet.reserve_nonce(0);
        assert_eq!((a, b), (0, 1));

        // `a` failed to broadcast after `b` was handed out.
        assert!(!wallet.release_nonce(a));
        let c = wallet.reserve_nonce(0);
        assert_ne!(c, b);
        assert_eq!(c, 2);
    }

    #[test]
    fn test_clones_share_nonce() {
        let wallet = Wallet::from_private_key(TEST_PRIVATE_KEY, 1).unwrap();
        let clone = wallet.clone();
        wallet.reserve_nonce(3);
        assert_eq!(clone.current_nonce(), 4);
    }

    #[test]
    fn test_invalid_private_key() {
        let result = Wallet::from_private_key("invalid_key", 1);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Invalid private key"));
    }

    #[test]
    fn test_missing_env_var() {
        let err = Wallet::from_env("SAFE_COORDINATOR_TEST_UNSET_KEY", 1).unwrap_err();
        assert!(err.to_string().contains("SAFE_COORDINATOR_TEST_UNSET_KEY"));
    }
}
