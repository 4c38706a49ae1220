//! Proposal execution: nonce check, hash, signatures, `execTransaction`.

use alloy::primitives::{Address, Bytes, TxHash, B256, U256};
use alloy::sol_types::SolCall;
use std::sync::Arc;
use uuid::Uuid;

use crate::blockchain::contracts::{ISafe, OPERATION_CALL};
use crate::blockchain::{ChainGateway, TxBuilder};
use crate::execution::hash::{SafeCall, SafeTxHashBuilder};
use crate::execution::proposal::{build_call, needs_owners, CallContext};
use crate::execution::signatures::SignatureAggregator;
use crate::execution::ExecutionError;
use crate::observability::metrics;
use crate::resilience::RetryPolicy;
use crate::store::{Proposal, RecordStore};

/// What owners must sign for a proposal right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedProposal {
    pub nonce: u64,
    pub target_hash: B256,
    pub call: SafeCall,
}

/// Account and gas limit used to pay for executions.
#[derive(Clone)]
struct Executor {
    builder: TxBuilder,
    gas_limit: u64,
}

#[derive(Clone)]
pub struct TransactionSubmitter {
    chain: Arc<dyn ChainGateway>,
    store: Arc<dyn RecordStore>,
    chain_id: u64,
    retry: RetryPolicy,
    executor: Option<Executor>,
}

impl TransactionSubmitter {
    /// A submitter that can prepare proposals but not execute them.
    pub fn new(chain: Arc<dyn ChainGateway>, store: Arc<dyn RecordStore>, chain_id: u64, retry: RetryPolicy) -> Self {
        Self {
            chain,
            store,
            chain_id,
            retry,
            executor: None,
        }
    }

    pub fn with_executor(mut self, builder: TxBuilder, gas_limit: u64) -> Self {
        self.executor = Some(Executor { builder, gas_limit });
        self
    }

    pub fn executor_address(&self) -> Option<Address> {
        self.executor.as_ref().map(|e| e.builder.address())
    }

    /// Compute the hash owners must sign at the Safe's current nonce and remember it.
    pub async fn prepare(&self, proposal_id: Uuid) -> Result<PreparedProposal, ExecutionError> {
        let proposal = self.load(proposal_id).await?;
        let nonce = self.chain.safe_nonce(proposal.safe_address).await?;
        let call = self.derive_call(&proposal).await?;
        let target_hash = SafeTxHashBuilder::new(self.chain_id, proposal.safe_address).hash(&call, nonce);

        self.store
            .record_proposal_target(proposal_id, nonce, target_hash)
            .await?;
        tracing::info!(
            proposal_id = %proposal_id,
            safe = %proposal.safe_address,
            kind = proposal.kind.name(),
            nonce,
            target_hash = %target_hash,
            "Proposal prepared for signing"
        );
        Ok(PreparedProposal {
            nonce,
            target_hash,
            call,
        })
    }

    /// Execute a proposal that has reached quorum.
    ///
    /// On failure the proposal stays pending and the error says what to fix.
    pub async fn execute(&self, proposal_id: Uuid) -> Result<TxHash, ExecutionError> {
        match self.try_execute(proposal_id).await {
            Ok(tx_hash) => {
                metrics::record_execution("submitted");
                Ok(tx_hash)
            }
            Err(e) => {
                metrics::record_execution("failed");
                tracing::warn!(proposal_id = %proposal_id, error = %e, "Proposal execution failed");
                Err(e)
            }
        }
    }

    async fn try_execute(&self, proposal_id: Uuid) -> Result<TxHash, ExecutionError> {
        let proposal = self.load(proposal_id).await?;
        if proposal.is_executed() {
            return Err(ExecutionError::AlreadyExecuted(proposal_id));
        }
        if proposal.current_signatures < proposal.required_signatures {
            return Err(ExecutionError::InsufficientSignatures {
                current: proposal.current_signatures,
                required: proposal.required_signatures,
            });
        }
        let executor = self.executor.as_ref().ok_or(ExecutionError::ExecutorUnavailable)?;
        let required = proposal.required_signatures as usize;
        let safe = proposal.safe_address;

        // Only signatures made against the live nonce can pass the contract's check.
        let current_nonce = self.chain.safe_nonce(safe).await?;
        let eligible: Vec<_> = self
            .store
            .list_valid_signatures(proposal_id)
            .await?
            .into_iter()
            .filter(|s| s.nonce == current_nonce)
            .collect();
        if eligible.len() < required {
            return Err(ExecutionError::NonceQuorum {
                current_nonce,
                eligible: eligible.len(),
                required,
            });
        }

        let call = self.derive_call(&proposal).await?;
        let target_hash = SafeTxHashBuilder::new(self.chain_id, safe).hash(&call, current_nonce);
        let aggregated = SignatureAggregator::aggregate(target_hash, &eligible, required, current_nonce)?;

        let data = Bytes::from(
            ISafe::execTransactionCall {
                to: call.to,
                value: call.value,
                data: call.data,
                operation: OPERATION_CALL,
                safeTxGas: U256::ZERO,
                baseGas: U256::ZERO,
                gasPrice: U256::ZERO,
                gasToken: Address::ZERO,
                refundReceiver: Address::ZERO,
                signatures: aggregated.signatures,
            }
            .abi_encode(),
        );

        let tx_hash = self
            .retry
            .run("submit_execution", || {
                executor.builder.send(safe, data.clone(), executor.gas_limit)
            })
            .await?;

        self.store.mark_executed(proposal_id, tx_hash).await?;
        tracing::info!(
            proposal_id = %proposal_id,
            safe = %safe,
            tx_hash = %tx_hash,
            nonce = current_nonce,
            signers = aggregated.signers.len(),
            "Proposal executed"
        );
        Ok(tx_hash)
    }

    async fn load(&self, proposal_id: Uuid) -> Result<Proposal, ExecutionError> {
        self.store
            .get_proposal(proposal_id)
            .await?
            .ok_or(ExecutionError::ProposalNotFound(proposal_id))
    }

    async fn derive_call(&self, proposal: &Proposal) -> Result<SafeCall, ExecutionError> {
        let owners = if needs_owners(&proposal.kind) {
            self.chain.safe_owners(proposal.safe_address).await?
        } else {
            Vec::new()
        };
        build_call(
            &proposal.kind,
            &CallContext {
                safe: proposal.safe_address,
                owners,
            },
        )
    }
}
