//! Push-based reconciliation from the factory's log subscription.

use alloy::primitives::Address;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;

use crate::blockchain::{BlockchainError, ChainGateway, ChainLog};
use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;
use crate::reconciler::event::decode_creation_log;
use crate::reconciler::state_machine::{ConfirmationStateMachine, Transition};
use crate::reconciler::{observe_creation, ReconcileError};
use crate::resilience::Backoff;
use crate::store::RecordStore;

/// Why [`EventSubscriber::listen`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenEnd {
    Shutdown,
    /// The node closed the stream.
    StreamEnded,
}

/// Reacts to `ProxyCreation` logs as the node pushes them.
#[derive(Clone)]
pub struct EventSubscriber {
    chain: Arc<dyn ChainGateway>,
    store: Arc<dyn RecordStore>,
    machine: ConfirmationStateMachine,
    factory: Address,
    confirmation_blocks: u32,
}

impl EventSubscriber {
    pub fn new(
        chain: Arc<dyn ChainGateway>,
        store: Arc<dyn RecordStore>,
        factory: Address,
        confirmation_blocks: u32,
    ) -> Self {
        Self {
            machine: ConfirmationStateMachine::new(store.clone()),
            chain,
            store,
            factory,
            confirmation_blocks,
        }
    }

    /// Consume one subscription until it ends or shutdown is signalled.
    ///
    /// Errors only when the subscription cannot be opened.
    pub async fn listen(&self, shutdown: &mut ShutdownSignal) -> Result<ListenEnd, BlockchainError> {
        let mut stream = self.chain.subscribe_creation_logs(self.factory).await?;
        metrics::record_subscription_active(true);
        tracing::info!(factory = %self.factory, "Listening for ProxyCreation events");

        let end = loop {
            tokio::select! {
                _ = shutdown.cancelled() => break ListenEnd::Shutdown,
                next = stream.next() => match next {
                    Some(log) => {
                        let tx_hash = log.tx_hash;
                        if let Err(e) = self.handle_log(log).await {
                            tracing::warn!(tx_hash = ?tx_hash, error = %e, "Failed to handle creation log");
                        }
                    }
                    None => break ListenEnd::StreamEnded,
                },
            }
        };

        metrics::record_subscription_active(false);
        Ok(end)
    }

    /// Process one pushed log.
    pub async fn handle_log(&self, log: ChainLog) -> Result<Transition, ReconcileError> {
        if log.removed {
            tracing::debug!(tx_hash = ?log.tx_hash, "Ignoring removed log");
            return Ok(Transition::Missing);
        }
        let Some(tx_hash) = log.tx_hash else {
            return Ok(Transition::Missing);
        };
        let event = decode_creation_log(&log)?;

        let Some(record) = self.store.get_record_by_hash(tx_hash).await? else {
            // Someone else's Safe.
            return Ok(Transition::Missing);
        };
        if !record.status.is_unresolved() {
            return Ok(Transition::Skipped { current: record.status });
        }

        let Some(receipt) = self.chain.receipt(tx_hash).await? else {
            // Log arrived before the node indexed the receipt; the poller will catch up.
            tracing::debug!(tx_hash = %tx_hash, "Receipt not yet available");
            return Ok(Transition::Skipped { current: record.status });
        };

        tracing::debug!(
            tx_hash = %tx_hash,
            safe = %event.proxy,
            encoding = ?event.encoding,
            "ProxyCreation observed"
        );
        observe_creation(
            self.chain.as_ref(),
            &self.machine,
            tx_hash,
            event.proxy,
            &receipt,
            self.confirmation_blocks,
        )
        .await
    }

    /// Keep a subscription open until shutdown, re-subscribing with backoff.
    pub async fn run(self, mut shutdown: ShutdownSignal, backoff: Backoff) {
        let mut failures = 0u32;

        while !shutdown.is_triggered() {
            let delay = match self.listen(&mut shutdown).await {
                Ok(ListenEnd::Shutdown) => break,
                Ok(ListenEnd::StreamEnded) => {
                    failures = 0;
                    tracing::warn!("Log subscription ended, re-subscribing");
                    backoff.jittered_delay(1)
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    let delay = backoff.jittered_delay(failures);
                    tracing::warn!(
                        error = %e,
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        "Log subscription failed"
                    );
                    delay
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.cancelled() => break,
            }
        }

        tracing::info!("Event subscriber stopped");
    }
}

/// Subscriber backoff from configured bounds.
pub fn resubscribe_backoff(base_ms: u64, max_ms: u64) -> Backoff {
    Backoff::new(Duration::from_millis(base_ms), Duration::from_millis(max_ms), 2.0)
}
