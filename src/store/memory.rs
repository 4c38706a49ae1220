//! In-process record store with JSON snapshots.

use alloy::primitives::{Address, TxHash, B256};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::store::types::{
    unix_now, MaterializeOutcome, Proposal, ProposalStatus, SafeWallet, SignatureRecord, StatusUpdate,
    TransactionRecord, TxStatus,
};
use crate::store::{RecordStore, StoreError, StoreResult};

/// On-disk form of the whole store.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    records: Vec<TransactionRecord>,
    wallets: Vec<SafeWallet>,
    proposals: Vec<Proposal>,
    signatures: Vec<SignatureRecord>,
}

/// A thread-safe store backed by concurrent maps.
///
/// Cloning shares the same maps.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    records: Arc<DashMap<TxHash, TransactionRecord>>,
    /// Record id → tx hash.
    record_ids: Arc<DashMap<Uuid, TxHash>>,
    wallets: Arc<DashMap<Address, SafeWallet>>,
    proposals: Arc<DashMap<Uuid, Proposal>>,
    /// Proposal id → signatures.
    signatures: Arc<DashMap<Uuid, Vec<SignatureRecord>>>,
    persistence_path: Option<PathBuf>,
}

impl InMemoryStore {
    /// Create a new empty store.
    pub fn new(persistence_path: Option<PathBuf>) -> Self {
        Self {
            persistence_path,
            ..Self::default()
        }
    }

    /// Load from file if it exists; later saves go to the same path.
    pub fn load_from_file(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let store = Self::new(Some(path.to_path_buf()));
        if path.exists() {
            let reader = BufReader::new(File::open(path)?);
            let snapshot: Snapshot = serde_json::from_reader(reader)?;

            for record in snapshot.records {
                store.record_ids.insert(record.id, record.tx_hash);
                store.records.insert(record.tx_hash, record);
            }
            for wallet in snapshot.wallets {
                store.wallets.insert(wallet.address, wallet);
            }
            for proposal in snapshot.proposals {
                store.proposals.insert(proposal.id, proposal);
            }
            for signature in snapshot.signatures {
                store.signatures.entry(signature.proposal_id).or_default().push(signature);
            }
            tracing::info!(
                path = %path.display(),
                records = store.records.len(),
                wallets = store.wallets.len(),
                proposals = store.proposals.len(),
                "Loaded store snapshot"
            );
        }
        Ok(store)
    }

    /// Write a snapshot if a path is configured.
    pub fn save_to_file(&self) -> StoreResult<()> {
        let Some(path) = &self.persistence_path else {
            return Ok(());
        };

        let snapshot = Snapshot {
            records: self.records.iter().map(|r| r.value().clone()).collect(),
            wallets: self.wallets.iter().map(|r| r.value().clone()).collect(),
            proposals: self.proposals.iter().map(|r| r.value().clone()).collect(),
            signatures: self.signatures.iter().flat_map(|r| r.value().clone()).collect(),
        };

        // Write beside the target and rename so a crash never leaves half a file.
        let tmp = path.with_extension("tmp");
        {
            let writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer(writer, &snapshot)?;
        }
        std::fs::rename(&tmp, path)?;

        tracing::info!(
            path = %path.display(),
            records = snapshot.records.len(),
            wallets = snapshot.wallets.len(),
            "Saved store snapshot"
        );
        Ok(())
    }

    fn sorted_by_age(mut records: Vec<TransactionRecord>, limit: usize) -> Vec<TransactionRecord> {
        records.sort_by_key(|r| (r.created_at, r.tx_hash));
        records.truncate(limit);
        records
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn create_record(&self, record: TransactionRecord) -> StoreResult<()> {
        match self.records.entry(record.tx_hash) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(format!("transaction {}", record.tx_hash))),
            Entry::Vacant(slot) => {
                self.record_ids.insert(record.id, record.tx_hash);
                slot.insert(record);
                Ok(())
            }
        }
    }

    async fn get_record(&self, id: Uuid) -> StoreResult<Option<TransactionRecord>> {
        let Some(tx_hash) = self.record_ids.get(&id).map(|r| *r.value()) else {
            return Ok(None);
        };
        Ok(self.records.get(&tx_hash).map(|r| r.value().clone()))
    }

    async fn get_record_by_hash(&self, tx_hash: TxHash) -> StoreResult<Option<TransactionRecord>> {
        Ok(self.records.get(&tx_hash).map(|r| r.value().clone()))
    }

    async fn list_unresolved(&self, limit: usize) -> StoreResult<Vec<TransactionRecord>> {
        let records = self
            .records
            .iter()
            .filter(|r| r.value().status.is_unresolved())
            .map(|r| r.value().clone())
            .collect();
        Ok(Self::sorted_by_age(records, limit))
    }

    async fn list_confirmed(&self, limit: usize) -> StoreResult<Vec<TransactionRecord>> {
        let records = self
            .records
            .iter()
            .filter(|r| {
                matches!(r.value().status, TxStatus::Confirmed | TxStatus::Processed)
                    && r.value().safe_address.is_some()
            })
            .map(|r| r.value().clone())
            .collect();
        Ok(Self::sorted_by_age(records, limit))
    }

    async fn update_status(
        &self,
        tx_hash: TxHash,
        expected: &[TxStatus],
        update: StatusUpdate,
    ) -> StoreResult<bool> {
        let Some(mut record) = self.records.get_mut(&tx_hash) else {
            return Ok(false);
        };
        if !expected.contains(&record.status) {
            return Ok(false);
        }
        record.apply(&update, unix_now());
        Ok(true)
    }

    async fn record_error(&self, tx_hash: TxHash, message: String) -> StoreResult<()> {
        let mut record = self
            .records
            .get_mut(&tx_hash)
            .ok_or_else(|| StoreError::NotFound(format!("transaction {}", tx_hash)))?;
        record.error_message = Some(message);
        Ok(())
    }

    async fn materialize_wallet(&self, tx_hash: TxHash, wallet: SafeWallet) -> StoreResult<MaterializeOutcome> {
        // Lock order: wallet shard, then record shard. Nothing takes them the other way round.
        match self.wallets.entry(wallet.address) {
            Entry::Occupied(existing) => Ok(MaterializeOutcome::AlreadyExists(existing.get().clone())),
            Entry::Vacant(slot) => {
                let mut record = self
                    .records
                    .get_mut(&tx_hash)
                    .ok_or_else(|| StoreError::NotFound(format!("transaction {}", tx_hash)))?;
                if record.status != TxStatus::Confirmed {
                    return Err(StoreError::Conflict(format!(
                        "transaction {} is {}, expected CONFIRMED",
                        tx_hash, record.status
                    )));
                }
                record.apply(&StatusUpdate::processed(), unix_now());
                slot.insert(wallet.clone());
                Ok(MaterializeOutcome::Created(wallet))
            }
        }
    }

    async fn get_wallet(&self, address: Address) -> StoreResult<Option<SafeWallet>> {
        Ok(self.wallets.get(&address).map(|r| r.value().clone()))
    }

    async fn delete_failed_before(&self, cutoff: u64) -> StoreResult<usize> {
        let doomed: Vec<(TxHash, Uuid)> = self
            .records
            .iter()
            .filter(|r| r.value().status == TxStatus::Failed && r.value().created_at < cutoff)
            .map(|r| (*r.key(), r.value().id))
            .collect();

        let mut deleted = 0;
        for (tx_hash, id) in doomed {
            // Re-check under the shard lock.
            if self
                .records
                .remove_if(&tx_hash, |_, r| r.status == TxStatus::Failed)
                .is_some()
            {
                self.record_ids.remove(&id);
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn status_counts(&self) -> StoreResult<BTreeMap<TxStatus, usize>> {
        let mut counts: BTreeMap<TxStatus, usize> = TxStatus::ALL.iter().map(|s| (*s, 0)).collect();
        for r in self.records.iter() {
            *counts.entry(r.value().status).or_default() += 1;
        }
        Ok(counts)
    }

    async fn insert_proposal(&self, proposal: Proposal) -> StoreResult<()> {
        match self.proposals.entry(proposal.id) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(format!("proposal {}", proposal.id))),
            Entry::Vacant(slot) => {
                slot.insert(proposal);
                Ok(())
            }
        }
    }

    async fn get_proposal(&self, id: Uuid) -> StoreResult<Option<Proposal>> {
        Ok(self.proposals.get(&id).map(|r| r.value().clone()))
    }

    async fn record_proposal_target(&self, id: Uuid, nonce: u64, target_hash: B256) -> StoreResult<()> {
        let mut proposal = self
            .proposals
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("proposal {}", id)))?;
        proposal.nonce = Some(nonce);
        proposal.target_hash = Some(target_hash);
        Ok(())
    }

    async fn list_valid_signatures(&self, proposal_id: Uuid) -> StoreResult<Vec<SignatureRecord>> {
        Ok(self
            .signatures
            .get(&proposal_id)
            .map(|r| r.value().iter().filter(|s| s.is_valid).cloned().collect())
            .unwrap_or_default())
    }

    async fn insert_signature(&self, signature: SignatureRecord) -> StoreResult<()> {
        // Lock order: proposal, then its signatures.
        let mut proposal = self
            .proposals
            .get_mut(&signature.proposal_id)
            .ok_or_else(|| StoreError::NotFound(format!("proposal {}", signature.proposal_id)))?;

        let mut existing = self.signatures.entry(signature.proposal_id).or_default();
        if existing.iter().any(|s| s.signer == signature.signer) {
            return Err(StoreError::Duplicate(format!(
                "signature from {} on proposal {}",
                signature.signer, signature.proposal_id
            )));
        }
        if signature.is_valid {
            proposal.current_signatures += 1;
        }
        existing.push(signature);
        Ok(())
    }

    async fn mark_executed(&self, id: Uuid, tx_hash: TxHash) -> StoreResult<bool> {
        let mut proposal = self
            .proposals
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("proposal {}", id)))?;
        if proposal.status == ProposalStatus::Executed {
            return Ok(false);
        }
        proposal.status = ProposalStatus::Executed;
        proposal.execution_tx_hash = Some(tx_hash);
        Ok(true)
    }
}
