//! Startup orchestration.
//!
//! # Responsibilities
//! - Connect to the chain and refuse to run against the wrong one
//! - Load the executor key when execution is enabled
//! - Open the store and notification sink
//! - Start the reconciliation loops and the admin API, then wait for a signal
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently

use alloy::primitives::Address;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

use crate::admin::{self, AdminState};
use crate::blockchain::{BlockchainClient, BlockchainError, ChainGateway, TxBuilder, Wallet};
use crate::config::{ConfigError, CoordinatorConfig};
use crate::execution::TransactionSubmitter;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::wait_for_signal;
use crate::notifications::{build_sink, NotificationError, NotificationSink};
use crate::reconciler::ReconciliationEngine;
use crate::resilience::RetryPolicy;
use crate::store::{InMemoryStore, StoreError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid {field}: '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("chain error: {0}")]
    Chain(#[from] BlockchainError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("notification error: {0}")]
    Notifications(#[from] NotificationError),

    #[error("admin server error: {0}")]
    Admin(#[from] std::io::Error),
}

/// Every long-lived component, wired together.
pub struct App {
    pub config: CoordinatorConfig,
    pub chain: Arc<dyn ChainGateway>,
    pub store: Arc<InMemoryStore>,
    pub sink: Arc<dyn NotificationSink>,
    pub engine: ReconciliationEngine,
    pub submitter: TransactionSubmitter,
    pub shutdown: Shutdown,
}

/// Connect to the configured RPC endpoints and assemble the app.
pub async fn bootstrap(config: CoordinatorConfig) -> Result<App, StartupError> {
    let shutdown = Shutdown::new();
    let retry = RetryPolicy::from_config(&config.retries, shutdown.subscribe());
    let client = BlockchainClient::new(config.blockchain.clone(), retry)?;
    assemble(config, Arc::new(client), shutdown).await
}

/// Assemble the app around an existing chain gateway.
pub async fn assemble(
    config: CoordinatorConfig,
    chain: Arc<dyn ChainGateway>,
    shutdown: Shutdown,
) -> Result<App, StartupError> {
    // 1. Wrong chain is fatal
    let expected = config.blockchain.chain_id;
    let actual = chain.chain_id().await?;
    if actual != expected {
        return Err(BlockchainError::ChainMismatch { expected, actual }.into());
    }
    tracing::info!(chain_id = actual, "Connected to chain");

    let factory = parse_address("contracts.factory_address", &config.contracts.factory_address)?;

    // 2. Store
    let store = Arc::new(match &config.store.snapshot_path {
        Some(path) => InMemoryStore::load_from_file(path)?,
        None => InMemoryStore::new(None),
    });

    // 3. Notifications
    let sink = build_sink(&config.notifications)?;

    // 4. Engines
    let engine = ReconciliationEngine::new(
        chain.clone(),
        store.clone(),
        sink.clone(),
        factory,
        config.blockchain.confirmation_blocks,
        config.reconciler.clone(),
    );

    let retry = RetryPolicy::from_config(&config.retries, shutdown.subscribe());
    let mut submitter = TransactionSubmitter::new(chain.clone(), store.clone(), expected, retry);
    if config.executor.enabled {
        let wallet = Wallet::from_env(&config.executor.private_key_env, expected)?;
        let builder = TxBuilder::new(chain.clone(), wallet, &config.blockchain);
        submitter = submitter.with_executor(builder, config.executor.gas_limit);
    } else {
        tracing::info!("Executor disabled; proposals can be prepared but not executed");
    }

    Ok(App {
        config,
        chain,
        store,
        sink,
        engine,
        submitter,
        shutdown,
    })
}

impl App {
    /// Run until SIGINT/SIGTERM, then drain and snapshot the store.
    pub async fn run(self) -> Result<(), StartupError> {
        let loops = self.engine.spawn(&self.shutdown);

        let admin = if self.config.admin.enabled {
            let addr: SocketAddr = self.config.admin.bind_address.parse().map_err(|_| {
                StartupError::InvalidAddress {
                    field: "admin.bind_address",
                    value: self.config.admin.bind_address.clone(),
                }
            })?;
            let state = AdminState {
                store: self.store.clone(),
                engine: self.engine.clone(),
                submitter: self.submitter.clone(),
                api_key: Arc::from(self.config.admin.api_key.as_str()),
                chain_id: self.config.blockchain.chain_id,
                factory: parse_address("contracts.factory_address", &self.config.contracts.factory_address)?,
                started_at: Instant::now(),
            };
            Some(tokio::spawn(admin::serve(addr, state, self.shutdown.subscribe())))
        } else {
            None
        };

        wait_for_signal(&self.shutdown).await;

        loops.join().await;
        if let Some(admin) = admin {
            match admin.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "Admin server failed"),
                Err(e) => tracing::error!(error = %e, "Admin task panicked"),
            }
        }

        self.store.save_to_file()?;
        tracing::info!("Shutdown complete");
        Ok(())
    }
}

fn parse_address(field: &'static str, value: &str) -> Result<Address, StartupError> {
    value.parse().map_err(|_| StartupError::InvalidAddress {
        field,
        value: value.to_string(),
    })
}
