//! Shared utilities for integration tests.
#![allow(dead_code)]

use alloy::primitives::{Address, Bytes, TxHash, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use async_trait::async_trait;
use futures_util::StreamExt;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

use safe_coordinator::blockchain::contracts::PROXY_CREATION_TOPIC;
use safe_coordinator::blockchain::{
    BlockchainError, BlockchainResult, ChainGateway, ChainLog, ChainReceipt, LogStream,
};
use safe_coordinator::store::{CreationParams, TransactionRecord};

pub const CHAIN_ID: u64 = 11155111;

/// Anvil's first account; pays for executions in tests.
pub const EXECUTOR_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

pub const GWEI: u128 = 1_000_000_000;

pub fn factory() -> Address {
    Address::repeat_byte(0xfa)
}

/// In-process chain with scripted state.
pub struct MockChain {
    pub chain_id: u64,
    pub head: AtomicU64,
    pub receipts: Mutex<HashMap<TxHash, ChainReceipt>>,
    pub receipt_calls: AtomicUsize,
    /// Receipt lookups for these hashes fail with an RPC error.
    pub receipt_errors: Mutex<HashSet<TxHash>>,
    pub safe_nonces: Mutex<HashMap<Address, u64>>,
    pub owners: Mutex<HashMap<Address, Vec<Address>>>,
    pub account_nonce: AtomicU64,
    pub gas_price: Mutex<u128>,
    /// Raw transactions accepted by `send_raw_transaction`.
    pub sent: Mutex<Vec<Bytes>>,
    /// Number of upcoming broadcasts that fail with a transient error.
    pub send_failures: AtomicU32,
    /// Number of upcoming subscription attempts that fail.
    pub subscribe_failures: AtomicU32,
    pub subscriptions: AtomicUsize,
    log_tx: Mutex<Option<mpsc::UnboundedSender<ChainLog>>>,
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            chain_id: CHAIN_ID,
            head: AtomicU64::new(100),
            receipts: Mutex::new(HashMap::new()),
            receipt_calls: AtomicUsize::new(0),
            receipt_errors: Mutex::new(HashSet::new()),
            safe_nonces: Mutex::new(HashMap::new()),
            owners: Mutex::new(HashMap::new()),
            account_nonce: AtomicU64::new(0),
            gas_price: Mutex::new(10 * GWEI),
            sent: Mutex::new(Vec::new()),
            send_failures: AtomicU32::new(0),
            subscribe_failures: AtomicU32::new(0),
            subscriptions: AtomicUsize::new(0),
            log_tx: Mutex::new(None),
        }
    }

    pub fn set_head(&self, block: u64) {
        self.head.store(block, Ordering::SeqCst);
    }

    pub fn add_receipt(&self, tx_hash: TxHash, receipt: ChainReceipt) {
        self.receipts.lock().unwrap().insert(tx_hash, receipt);
    }

    pub fn set_safe(&self, safe: Address, nonce: u64, owners: Vec<Address>) {
        self.safe_nonces.lock().unwrap().insert(safe, nonce);
        self.owners.lock().unwrap().insert(safe, owners);
    }

    /// Push a log to the open subscription. Returns false if none is open.
    pub fn push_log(&self, log: ChainLog) -> bool {
        match self.log_tx.lock().unwrap().as_ref() {
            Some(tx) => tx.send(log).is_ok(),
            None => false,
        }
    }

    /// End the open subscription stream.
    pub fn drop_subscription(&self) {
        self.log_tx.lock().unwrap().take();
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl ChainGateway for MockChain {
    async fn chain_id(&self) -> BlockchainResult<u64> {
        Ok(self.chain_id)
    }

    async fn block_number(&self) -> BlockchainResult<u64> {
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn receipt(&self, tx_hash: TxHash) -> BlockchainResult<Option<ChainReceipt>> {
        self.receipt_calls.fetch_add(1, Ordering::SeqCst);
        if self.receipt_errors.lock().unwrap().contains(&tx_hash) {
            return Err(BlockchainError::Rpc("header not found".to_string()));
        }
        Ok(self.receipts.lock().unwrap().get(&tx_hash).cloned())
    }

    async fn subscribe_creation_logs(&self, _factory: Address) -> BlockchainResult<LogStream> {
        let failing = self
            .subscribe_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(BlockchainError::Subscription("connection refused".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *self.log_tx.lock().unwrap() = Some(tx);
        self.subscriptions.fetch_add(1, Ordering::SeqCst);

        let stream = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|log| (log, rx))
        });
        Ok(stream.boxed())
    }

    async fn safe_nonce(&self, safe: Address) -> BlockchainResult<u64> {
        self.safe_nonces
            .lock()
            .unwrap()
            .get(&safe)
            .copied()
            .ok_or_else(|| BlockchainError::Rpc("execution reverted".to_string()))
    }

    async fn safe_owners(&self, safe: Address) -> BlockchainResult<Vec<Address>> {
        Ok(self.owners.lock().unwrap().get(&safe).cloned().unwrap_or_default())
    }

    async fn account_nonce(&self, _address: Address) -> BlockchainResult<u64> {
        Ok(self.account_nonce.load(Ordering::SeqCst))
    }

    async fn gas_price(&self) -> BlockchainResult<u128> {
        Ok(*self.gas_price.lock().unwrap())
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> BlockchainResult<TxHash> {
        let failing = self
            .send_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(BlockchainError::Transport("connection reset".to_string()));
        }

        let tx_hash = alloy::primitives::keccak256(&raw);
        self.sent.lock().unwrap().push(raw);
        self.account_nonce.fetch_add(1, Ordering::SeqCst);
        Ok(tx_hash)
    }
}

/// `ProxyCreation` log in the legacy (non-indexed) encoding.
pub fn creation_log(tx_hash: TxHash, proxy: Address, block: u64) -> ChainLog {
    let mut data = vec![0u8; 12];
    data.extend_from_slice(proxy.as_slice());
    data.extend_from_slice(Address::repeat_byte(0x51).into_word().as_slice());
    ChainLog {
        address: factory(),
        topics: vec![PROXY_CREATION_TOPIC],
        data: Bytes::from(data),
        block_number: Some(block),
        tx_hash: Some(tx_hash),
        tx_index: Some(0),
        block_hash: Some(B256::repeat_byte(0xbb)),
        log_index: Some(0),
        removed: false,
    }
}

pub fn creation_receipt(tx_hash: TxHash, proxy: Address, block: u64) -> ChainReceipt {
    ChainReceipt {
        status: true,
        block_number: block,
        gas_used: 262_000,
        logs: vec![creation_log(tx_hash, proxy, block)],
    }
}

pub fn submission(byte: u8) -> TransactionRecord {
    TransactionRecord::new(
        TxHash::repeat_byte(byte),
        format!("user-{}", byte),
        CreationParams {
            name: format!("Treasury {}", byte),
            description: Some("team funds".to_string()),
            owners: vec![Address::repeat_byte(0xaa), Address::repeat_byte(0xbb)],
            threshold: 2,
            chain_id: CHAIN_ID,
        },
    )
}

/// Deterministic owner key.
pub fn owner(seed: u8) -> PrivateKeySigner {
    PrivateKeySigner::from_bytes(&B256::repeat_byte(seed)).unwrap()
}

/// Sign a Safe transaction hash, returning `0x` hex with `v` in {27, 28}.
pub fn sign(key: &PrivateKeySigner, hash: B256) -> String {
    let sig = key.sign_hash_sync(&hash).unwrap();
    alloy::hex::encode_prefixed(sig.as_bytes())
}

/// Poll `check` until it returns true or `timeout` elapses.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
