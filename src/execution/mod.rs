//! Transaction execution engine.
//!
//! # Data Flow
//! ```text
//! Proposal (kind, signatures)
//!     → proposal.rs   (kind → Safe call via handler table)
//!     → hash.rs       (EIP-712 SafeTx hash at the on-chain nonce)
//!     → signatures.rs (recover, filter, order, pack)
//!     → submitter.rs  (execTransaction, signed by the executor, retried)
//! ```
//!
//! # Design Decisions
//! - Signatures made for a stale nonce are never submitted
//! - A bad signature is excluded, never fatal; only a missing quorum is

pub mod hash;
pub mod proposal;
pub mod signatures;
pub mod submitter;

use alloy::primitives::Address;
use thiserror::Error;
use uuid::Uuid;

use crate::blockchain::BlockchainError;
use crate::resilience::RetryError;
use crate::store::StoreError;

pub use hash::{SafeCall, SafeTxHashBuilder};
pub use signatures::{Aggregated, SignatureAggregator, SignatureDefect};
pub use submitter::{PreparedProposal, TransactionSubmitter};

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("proposal {0} not found")]
    ProposalNotFound(Uuid),

    #[error("proposal {0} was already executed")]
    AlreadyExecuted(Uuid),

    #[error("proposal has {current} of {required} required signatures")]
    InsufficientSignatures { current: u32, required: u32 },

    #[error(
        "only {eligible} of {required} required signatures were made for the current Safe nonce \
         {current_nonce}; owners must re-sign"
    )]
    NonceQuorum {
        current_nonce: u64,
        eligible: usize,
        required: usize,
    },

    #[error(
        "only {valid} of {required} required signatures are valid at Safe nonce {current_nonce}; \
         owners must re-sign"
    )]
    SignatureQuorum {
        current_nonce: u64,
        valid: usize,
        required: usize,
    },

    #[error("{0} is not an owner of the Safe")]
    OwnerNotFound(Address),

    #[error("invalid proposal: {0}")]
    InvalidProposal(String),

    #[error("no executor key configured")]
    ExecutorUnavailable,

    #[error(transparent)]
    Chain(#[from] BlockchainError),

    #[error("submission failed: {0}")]
    Submission(#[from] RetryError<BlockchainError>),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ExecutionError {
    /// Whether owners have to produce fresh signatures before retrying.
    pub fn requires_resign(&self) -> bool {
        matches!(self, Self::NonceQuorum { .. } | Self::SignatureQuorum { .. })
    }
}
