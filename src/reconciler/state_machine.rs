//! Forward-only status transitions for tracked transactions.
//!
//! Every transition is a conditional store update guarded by the statuses it
//! may start from. Two observers applying the same status therefore produce
//! exactly one write; the loser sees [`Transition::Skipped`].

use alloy::primitives::{Address, TxHash};
use std::sync::Arc;

use crate::observability::metrics;
use crate::store::{
    MaterializeOutcome, RecordStore, SafeWallet, StatusUpdate, StoreResult, TxStatus,
};

/// What happened when a status was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied { from: TxStatus, to: TxStatus },
    /// The record was already at or past the target.
    Skipped { current: TxStatus },
    /// No record for the hash.
    Missing,
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

#[derive(Clone)]
pub struct ConfirmationStateMachine {
    store: Arc<dyn RecordStore>,
}

impl ConfirmationStateMachine {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Apply `update` if the record's current status allows it.
    pub async fn apply(&self, tx_hash: TxHash, update: StatusUpdate) -> StoreResult<Transition> {
        let target = update.status;
        let Some(record) = self.store.get_record_by_hash(tx_hash).await? else {
            return Ok(Transition::Missing);
        };
        let from = record.status;
        if !from.can_advance_to(target) {
            return Ok(Transition::Skipped { current: from });
        }

        if !self.store.update_status(tx_hash, target.predecessors(), update).await? {
            // Lost a race; report where the winner left it.
            return Ok(match self.store.get_record_by_hash(tx_hash).await? {
                Some(r) => Transition::Skipped { current: r.status },
                None => Transition::Missing,
            });
        }

        metrics::record_transition(target.as_str());
        tracing::info!(tx_hash = %tx_hash, from = %from, to = %target, "Status transition");
        Ok(Transition::Applied { from, to: target })
    }

    /// Seen on-chain, not yet deep enough.
    pub async fn mark_pending(&self, tx_hash: TxHash) -> StoreResult<Transition> {
        self.apply(tx_hash, StatusUpdate::pending()).await
    }

    pub async fn confirm(
        &self,
        tx_hash: TxHash,
        safe_address: Address,
        block_number: u64,
        gas_used: u64,
    ) -> StoreResult<Transition> {
        self.apply(tx_hash, StatusUpdate::confirmed(safe_address, block_number, gas_used))
            .await
    }

    pub async fn fail(&self, tx_hash: TxHash, message: impl Into<String>) -> StoreResult<Transition> {
        self.apply(tx_hash, StatusUpdate::failed(message)).await
    }

    pub async fn complete(&self, tx_hash: TxHash) -> StoreResult<Transition> {
        self.apply(tx_hash, StatusUpdate::completed()).await
    }

    /// Persist the wallet and move the record to PROCESSED in one store call.
    pub async fn materialize(&self, tx_hash: TxHash, wallet: SafeWallet) -> StoreResult<MaterializeOutcome> {
        let outcome = self.store.materialize_wallet(tx_hash, wallet).await?;
        if let MaterializeOutcome::Created(wallet) = &outcome {
            metrics::record_transition(TxStatus::Processed.as_str());
            tracing::info!(
                tx_hash = %tx_hash,
                safe = %wallet.address,
                from = %TxStatus::Confirmed,
                to = %TxStatus::Processed,
                "Status transition"
            );
        }
        Ok(outcome)
    }
}
