//! Blockchain reconciliation engine.
//!
//! # Data Flow
//! ```text
//! register_submission → store (SUBMITTED)
//!
//! subscriber.rs (push: ProxyCreation logs) ─┐
//!                                           ├→ state_machine.rs → store (PENDING / CONFIRMED / FAILED)
//! poller.rs     (pull: receipts)          ──┘
//!
//! materializer.rs: CONFIRMED → wallet + PROCESSED → COMPLETED → notification
//!                  + retention sweep of old FAILED records
//! ```
//!
//! # Design Decisions
//! - Subscriber and poller race freely; status-guarded updates make the loser a no-op
//! - The poller is the source of truth; the subscriber only makes things faster
//! - Each loop is its own task and stops on the shared shutdown signal

pub mod event;
pub mod materializer;
pub mod poller;
pub mod state_machine;
pub mod subscriber;

use alloy::primitives::{Address, TxHash};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::blockchain::{BlockchainError, ChainGateway, ChainReceipt};
use crate::config::ReconcilerConfig;
use crate::lifecycle::Shutdown;
use crate::notifications::NotificationSink;
use crate::store::{RecordStore, StoreError, TransactionRecord};

pub use event::{decode_creation_log, CreationEncoding, CreationEvent, CreationLogError};
pub use materializer::{MaterializeSummary, RecordMaterializer};
pub use poller::{PollSummary, PollingReconciler};
pub use state_machine::{ConfirmationStateMachine, Transition};
pub use subscriber::{EventSubscriber, ListenEnd};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Chain(#[from] BlockchainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid creation log: {0}")]
    CreationLog(#[from] CreationLogError),
}

/// Drive a record whose creation was observed in `receipt`.
///
/// Below the configured depth the record only moves to PENDING; the poller
/// confirms it on a later pass.
pub(crate) async fn observe_creation(
    chain: &dyn ChainGateway,
    machine: &ConfirmationStateMachine,
    tx_hash: TxHash,
    safe_address: Address,
    receipt: &ChainReceipt,
    confirmation_blocks: u32,
) -> Result<Transition, ReconcileError> {
    if confirmation_blocks > 0 {
        let head = chain.block_number().await?;
        let depth = head.saturating_sub(receipt.block_number);
        if depth < u64::from(confirmation_blocks) {
            tracing::debug!(
                tx_hash = %tx_hash,
                depth,
                required = confirmation_blocks,
                "Waiting for confirmations"
            );
            return Ok(machine.mark_pending(tx_hash).await?);
        }
    }

    Ok(machine
        .confirm(tx_hash, safe_address, receipt.block_number, receipt.gas_used)
        .await?)
}

/// How long FAILED records are kept before the sweep deletes them.
pub(crate) fn retention_window(hours: u64) -> Duration {
    Duration::from_secs(hours.saturating_mul(3600))
}

/// Owns the three reconciliation loops.
#[derive(Clone)]
pub struct ReconciliationEngine {
    chain: Arc<dyn ChainGateway>,
    store: Arc<dyn RecordStore>,
    sink: Arc<dyn NotificationSink>,
    factory: Address,
    confirmation_blocks: u32,
    config: ReconcilerConfig,
}

impl ReconciliationEngine {
    pub fn new(
        chain: Arc<dyn ChainGateway>,
        store: Arc<dyn RecordStore>,
        sink: Arc<dyn NotificationSink>,
        factory: Address,
        confirmation_blocks: u32,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            chain,
            store,
            sink,
            factory,
            confirmation_blocks,
            config,
        }
    }

    /// Start tracking a submitted creation. A tx hash can only be registered once.
    pub async fn register_submission(&self, record: TransactionRecord) -> Result<(), ReconcileError> {
        let tx_hash = record.tx_hash;
        let user_id = record.user_id.clone();
        self.store.create_record(record).await?;
        tracing::info!(tx_hash = %tx_hash, user_id = %user_id, "Tracking Safe creation");
        Ok(())
    }

    pub fn subscriber(&self) -> EventSubscriber {
        EventSubscriber::new(
            self.chain.clone(),
            self.store.clone(),
            self.factory,
            self.confirmation_blocks,
        )
    }

    pub fn poller(&self) -> PollingReconciler {
        PollingReconciler::new(
            self.chain.clone(),
            self.store.clone(),
            self.factory,
            self.confirmation_blocks,
            self.config.batch_size,
            Duration::from_secs(self.config.submission_timeout_secs),
        )
    }

    pub fn materializer(&self) -> RecordMaterializer {
        RecordMaterializer::new(
            self.store.clone(),
            self.sink.clone(),
            self.config.batch_size,
            retention_window(self.config.failed_retention_hours),
        )
    }

    /// Spawn every loop on the current runtime.
    pub fn spawn(&self, shutdown: &Shutdown) -> EngineHandle {
        let mut tasks = Vec::new();

        if self.config.subscriber_enabled {
            let backoff = subscriber::resubscribe_backoff(
                self.config.resubscribe_base_ms,
                self.config.resubscribe_max_ms,
            );
            tasks.push((
                "subscriber",
                tokio::spawn(self.subscriber().run(shutdown.subscribe(), backoff)),
            ));
        }

        tasks.push((
            "poller",
            tokio::spawn(
                self.poller()
                    .run(Duration::from_secs(self.config.poll_interval_secs), shutdown.subscribe()),
            ),
        ));
        tasks.push((
            "materializer",
            tokio::spawn(self.materializer().run(
                Duration::from_secs(self.config.materialize_interval_secs),
                shutdown.subscribe(),
            )),
        ));

        tracing::info!(tasks = tasks.len(), factory = %self.factory, "Reconciliation engine started");
        EngineHandle { tasks }
    }
}

/// Join handles of the running loops.
pub struct EngineHandle {
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl EngineHandle {
    pub fn task_names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|(name, _)| *name).collect()
    }

    /// Wait for every loop to exit.
    pub async fn join(self) {
        for (name, handle) in self.tasks {
            if let Err(e) = handle.await {
                tracing::error!(task = name, error = %e, "Engine task panicked");
            }
        }
    }
}
