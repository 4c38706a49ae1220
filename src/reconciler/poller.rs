//! Pull-based reconciliation: the fallback that never misses a record.

use alloy::primitives::Address;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;

use crate::blockchain::ChainGateway;
use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;
use crate::reconciler::event::find_creation_address;
use crate::reconciler::state_machine::{ConfirmationStateMachine, Transition};
use crate::reconciler::{observe_creation, ReconcileError};
use crate::store::{unix_now, RecordStore, TransactionRecord, TxStatus};

/// Counts from one polling pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub checked: usize,
    pub pending: usize,
    pub confirmed: usize,
    pub failed: usize,
    pub errors: usize,
}

impl PollSummary {
    fn count(&mut self, transition: Transition) {
        if let Transition::Applied { to, .. } = transition {
            match to {
                TxStatus::Pending => self.pending += 1,
                TxStatus::Confirmed => self.confirmed += 1,
                TxStatus::Failed => self.failed += 1,
                _ => {}
            }
        }
    }
}

#[derive(Clone)]
pub struct PollingReconciler {
    chain: Arc<dyn ChainGateway>,
    store: Arc<dyn RecordStore>,
    machine: ConfirmationStateMachine,
    factory: Address,
    confirmation_blocks: u32,
    batch_size: usize,
    submission_timeout: Duration,
}

impl PollingReconciler {
    pub fn new(
        chain: Arc<dyn ChainGateway>,
        store: Arc<dyn RecordStore>,
        factory: Address,
        confirmation_blocks: u32,
        batch_size: usize,
        submission_timeout: Duration,
    ) -> Self {
        Self {
            machine: ConfirmationStateMachine::new(store.clone()),
            chain,
            store,
            factory,
            confirmation_blocks,
            batch_size,
            submission_timeout,
        }
    }

    /// Check every unresolved record once.
    ///
    /// A failure on one record is logged and does not stop the pass.
    pub async fn tick(&self) -> Result<PollSummary, ReconcileError> {
        let records = self.store.list_unresolved(self.batch_size).await?;
        let mut summary = PollSummary {
            checked: records.len(),
            ..PollSummary::default()
        };

        for record in records {
            match self.reconcile(&record).await {
                Ok(transition) => summary.count(transition),
                Err(e) => {
                    summary.errors += 1;
                    tracing::warn!(tx_hash = %record.tx_hash, error = %e, "Failed to reconcile record");
                    if let Err(store_err) = self.store.record_error(record.tx_hash, e.to_string()).await {
                        tracing::warn!(
                            tx_hash = %record.tx_hash,
                            error = %store_err,
                            "Failed to record reconcile error"
                        );
                    }
                }
            }
        }

        if summary.checked > 0 {
            tracing::debug!(?summary, "Polling pass finished");
        }
        Ok(summary)
    }

    async fn reconcile(&self, record: &TransactionRecord) -> Result<Transition, ReconcileError> {
        let tx_hash = record.tx_hash;

        let Some(receipt) = self.chain.receipt(tx_hash).await? else {
            let age = unix_now().saturating_sub(record.created_at);
            if age >= self.submission_timeout.as_secs() {
                return Ok(self
                    .machine
                    .fail(tx_hash, "transaction not mined within timeout")
                    .await?);
            }
            return Ok(Transition::Skipped { current: record.status });
        };

        if !receipt.status {
            return Ok(self.machine.fail(tx_hash, "on-chain execution failed").await?);
        }

        let safe_address = match find_creation_address(&receipt.logs, self.factory) {
            Some(Ok(address)) => address,
            Some(Err(e)) => {
                return Ok(self
                    .machine
                    .fail(tx_hash, format!("malformed creation event: {}", e))
                    .await?)
            }
            None => return Ok(self.machine.fail(tx_hash, "no creation event in receipt").await?),
        };

        observe_creation(
            self.chain.as_ref(),
            &self.machine,
            tx_hash,
            safe_address,
            &receipt,
            self.confirmation_blocks,
        )
        .await
    }

    /// Poll on a fixed interval until shutdown.
    pub async fn run(self, interval: Duration, mut shutdown: ShutdownSignal) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_secs = interval.as_secs(), "Polling reconciler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.cancelled() => break,
            }

            let started = Instant::now();
            if let Err(e) = self.tick().await {
                tracing::error!(error = %e, "Polling pass failed");
            }
            metrics::record_poll_tick(started.elapsed());
        }

        tracing::info!("Polling reconciler stopped");
    }
}
