//! Turns confirmed records into wallet entities and tells the owner.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

use crate::lifecycle::ShutdownSignal;
use crate::notifications::{Notification, NotificationSink, SAFE_CREATION_UPDATE};
use crate::observability::metrics;
use crate::reconciler::state_machine::ConfirmationStateMachine;
use crate::reconciler::ReconcileError;
use crate::store::{unix_now, MaterializeOutcome, RecordStore, SafeWallet, TransactionRecord, TxStatus};

/// Counts from one materializer pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaterializeSummary {
    pub created: usize,
    pub existing: usize,
    pub completed: usize,
    pub purged: usize,
    pub errors: usize,
}

#[derive(Clone)]
pub struct RecordMaterializer {
    store: Arc<dyn RecordStore>,
    sink: Arc<dyn NotificationSink>,
    machine: ConfirmationStateMachine,
    batch_size: usize,
    failed_retention: Duration,
}

impl RecordMaterializer {
    pub fn new(
        store: Arc<dyn RecordStore>,
        sink: Arc<dyn NotificationSink>,
        batch_size: usize,
        failed_retention: Duration,
    ) -> Self {
        Self {
            machine: ConfirmationStateMachine::new(store.clone()),
            store,
            sink,
            batch_size,
            failed_retention,
        }
    }

    /// Materialize confirmed records, then run the retention sweep.
    pub async fn tick(&self) -> Result<MaterializeSummary, ReconcileError> {
        let mut summary = MaterializeSummary::default();

        for record in self.store.list_confirmed(self.batch_size).await? {
            if let Err(e) = self.materialize(&record, &mut summary).await {
                summary.errors += 1;
                tracing::warn!(tx_hash = %record.tx_hash, error = %e, "Failed to materialize record");
            }
        }

        let cutoff = unix_now().saturating_sub(self.failed_retention.as_secs());
        summary.purged = self.store.delete_failed_before(cutoff).await?;
        if summary.purged > 0 {
            tracing::info!(purged = summary.purged, "Removed expired FAILED records");
        }

        Ok(summary)
    }

    async fn materialize(
        &self,
        record: &TransactionRecord,
        summary: &mut MaterializeSummary,
    ) -> Result<(), ReconcileError> {
        let Some(wallet) = SafeWallet::from_record(record) else {
            return Ok(());
        };

        let wallet = match record.status {
            TxStatus::Confirmed => match self.machine.materialize(record.tx_hash, wallet).await? {
                MaterializeOutcome::Created(wallet) => {
                    summary.created += 1;
                    wallet
                }
                MaterializeOutcome::AlreadyExists(wallet) => {
                    summary.existing += 1;
                    tracing::info!(
                        tx_hash = %record.tx_hash,
                        safe = %wallet.address,
                        "Wallet already exists, skipping creation"
                    );
                    wallet
                }
            },
            // Interrupted after the wallet was written.
            TxStatus::Processed => match self.store.get_wallet(wallet.address).await? {
                Some(existing) => existing,
                None => return Ok(()),
            },
            _ => return Ok(()),
        };

        let transition = self.machine.complete(record.tx_hash).await?;
        if !transition.is_applied() {
            return Ok(());
        }
        summary.completed += 1;

        if wallet.source_record_id == record.id {
            self.notify(record, &wallet).await;
        }
        Ok(())
    }

    async fn notify(&self, record: &TransactionRecord, wallet: &SafeWallet) {
        let notification = Notification::new(
            SAFE_CREATION_UPDATE,
            serde_json::json!({
                "transaction_id": record.id,
                "status": TxStatus::Completed,
                "safe_address": wallet.address,
                "safe_name": wallet.name,
            }),
        );

        match self.sink.publish_to_user(&record.user_id, notification).await {
            Ok(()) => metrics::record_notification("sent"),
            Err(e) => {
                metrics::record_notification("failed");
                tracing::warn!(
                    tx_hash = %record.tx_hash,
                    user_id = %record.user_id,
                    error = %e,
                    "Failed to publish notification"
                );
            }
        }
    }

    /// Materialize on a fixed interval until shutdown.
    pub async fn run(self, interval: Duration, mut shutdown: ShutdownSignal) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_secs = interval.as_secs(), "Record materializer started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.cancelled() => break,
            }

            match self.tick().await {
                Ok(summary) if summary.created + summary.completed > 0 => {
                    tracing::debug!(?summary, "Materializer pass finished");
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Materializer pass failed"),
            }
        }

        tracing::info!("Record materializer stopped");
    }
}
