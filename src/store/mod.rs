//! Record persistence.
//!
//! The engine reads and writes records only through [`RecordStore`]. Status
//! changes are conditional on the record's current status, which is what makes
//! two observers racing on the same transaction harmless.

pub mod memory;
pub mod types;

use alloy::primitives::{Address, TxHash, B256};
use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

pub use memory::InMemoryStore;
pub use types::{
    unix_now, CreationParams, MaterializeOutcome, Proposal, ProposalKind, ProposalStatus, SafeWallet,
    SignatureRecord, StatusUpdate, TransactionRecord, TxStatus,
};

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique key is already taken.
    #[error("duplicate {0}")]
    Duplicate(String),

    #[error("{0} not found")]
    NotFound(String),

    /// The row is not in the state the operation requires.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot format error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a new record; rejects a tx hash that is already tracked.
    async fn create_record(&self, record: TransactionRecord) -> StoreResult<()>;

    async fn get_record(&self, id: Uuid) -> StoreResult<Option<TransactionRecord>>;

    async fn get_record_by_hash(&self, tx_hash: TxHash) -> StoreResult<Option<TransactionRecord>>;

    /// SUBMITTED and PENDING records, oldest first.
    async fn list_unresolved(&self, limit: usize) -> StoreResult<Vec<TransactionRecord>>;

    /// CONFIRMED records that carry a Safe address, oldest first.
    ///
    /// PROCESSED records are included so an interrupted materialization
    /// can still complete.
    async fn list_confirmed(&self, limit: usize) -> StoreResult<Vec<TransactionRecord>>;

    /// Apply `update` only if the record's status is one of `expected`.
    ///
    /// Returns whether a row was written.
    async fn update_status(
        &self,
        tx_hash: TxHash,
        expected: &[TxStatus],
        update: StatusUpdate,
    ) -> StoreResult<bool>;

    /// Note an error on a record without changing its status.
    async fn record_error(&self, tx_hash: TxHash, message: String) -> StoreResult<()>;

    /// Insert the wallet and move its CONFIRMED record to PROCESSED as one step.
    ///
    /// Idempotent on the wallet address.
    async fn materialize_wallet(&self, tx_hash: TxHash, wallet: SafeWallet) -> StoreResult<MaterializeOutcome>;

    async fn get_wallet(&self, address: Address) -> StoreResult<Option<SafeWallet>>;

    /// Delete FAILED records created before `cutoff` (unix seconds).
    async fn delete_failed_before(&self, cutoff: u64) -> StoreResult<usize>;

    async fn status_counts(&self) -> StoreResult<BTreeMap<TxStatus, usize>>;

    async fn insert_proposal(&self, proposal: Proposal) -> StoreResult<()>;

    async fn get_proposal(&self, id: Uuid) -> StoreResult<Option<Proposal>>;

    /// Remember the nonce and hash owners are asked to sign.
    async fn record_proposal_target(&self, id: Uuid, nonce: u64, target_hash: B256) -> StoreResult<()>;

    /// Signatures flagged valid for `proposal_id`.
    async fn list_valid_signatures(&self, proposal_id: Uuid) -> StoreResult<Vec<SignatureRecord>>;

    /// Insert a signature; at most one per (proposal, signer).
    async fn insert_signature(&self, signature: SignatureRecord) -> StoreResult<()>;

    /// Move a pending proposal to executed. Returns false if it already was.
    async fn mark_executed(&self, id: Uuid, tx_hash: TxHash) -> StoreResult<bool>;
}
