//! Records owned by the store.

use alloy::primitives::{Address, Bytes, TxHash, B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Seconds since the unix epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Lifecycle of a tracked wallet-creation transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxStatus {
    Submitted,
    Pending,
    Confirmed,
    Processed,
    Completed,
    Failed,
}

impl TxStatus {
    pub const ALL: [TxStatus; 6] = [
        Self::Submitted,
        Self::Pending,
        Self::Confirmed,
        Self::Processed,
        Self::Completed,
        Self::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "SUBMITTED",
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Processed => "PROCESSED",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Still waiting for the chain.
    pub fn is_unresolved(&self) -> bool {
        matches!(self, Self::Submitted | Self::Pending)
    }

    /// States a record may be in for a move to `self` to apply.
    ///
    /// FAILED can be entered from any non-terminal state.
    pub fn predecessors(&self) -> &'static [TxStatus] {
        match self {
            Self::Submitted => &[],
            Self::Pending => &[Self::Submitted],
            Self::Confirmed => &[Self::Submitted, Self::Pending],
            Self::Processed => &[Self::Confirmed],
            Self::Completed => &[Self::Confirmed, Self::Processed],
            Self::Failed => &[Self::Submitted, Self::Pending, Self::Confirmed, Self::Processed],
        }
    }

    pub fn can_advance_to(&self, next: TxStatus) -> bool {
        next.predecessors().contains(self)
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters the Safe was requested with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreationParams {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub owners: Vec<Address>,
    pub threshold: u32,
    pub chain_id: u64,
}

/// One submitted, not yet reconciled wallet creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub tx_hash: TxHash,
    pub user_id: String,
    pub status: TxStatus,
    pub safe_address: Option<Address>,
    pub block_number: Option<u64>,
    pub gas_used: Option<u64>,
    pub retry_count: u32,
    pub error_message: Option<String>,
    pub created_at: u64,
    pub confirmed_at: Option<u64>,
    pub processed_at: Option<u64>,
    pub params: CreationParams,
}

impl TransactionRecord {
    /// A fresh SUBMITTED record.
    pub fn new(tx_hash: TxHash, user_id: impl Into<String>, params: CreationParams) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx_hash,
            user_id: user_id.into(),
            status: TxStatus::Submitted,
            safe_address: None,
            block_number: None,
            gas_used: None,
            retry_count: 0,
            error_message: None,
            created_at: unix_now(),
            confirmed_at: None,
            processed_at: None,
            params,
        }
    }

    /// Write `update` into the record. Does not check the transition.
    pub fn apply(&mut self, update: &StatusUpdate, now: u64) {
        self.status = update.status;
        if let Some(address) = update.safe_address {
            self.safe_address = Some(address);
        }
        if let Some(block) = update.block_number {
            self.block_number = Some(block);
        }
        if let Some(gas) = update.gas_used {
            self.gas_used = Some(gas);
        }
        match update.status {
            TxStatus::Confirmed => self.confirmed_at = Some(now),
            TxStatus::Processed => self.processed_at = Some(now),
            TxStatus::Failed => {
                // A failed record never carries an address.
                self.safe_address = None;
                self.retry_count += 1;
                self.error_message = update.error_message.clone();
            }
            _ => {}
        }
    }
}

/// Fields written together with a status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: TxStatus,
    pub safe_address: Option<Address>,
    pub block_number: Option<u64>,
    pub gas_used: Option<u64>,
    pub error_message: Option<String>,
}

impl StatusUpdate {
    fn bare(status: TxStatus) -> Self {
        Self {
            status,
            safe_address: None,
            block_number: None,
            gas_used: None,
            error_message: None,
        }
    }

    pub fn pending() -> Self {
        Self::bare(TxStatus::Pending)
    }

    pub fn confirmed(safe_address: Address, block_number: u64, gas_used: u64) -> Self {
        Self {
            safe_address: Some(safe_address),
            block_number: Some(block_number),
            gas_used: Some(gas_used),
            ..Self::bare(TxStatus::Confirmed)
        }
    }

    pub fn processed() -> Self {
        Self::bare(TxStatus::Processed)
    }

    pub fn completed() -> Self {
        Self::bare(TxStatus::Completed)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Self::bare(TxStatus::Failed)
        }
    }
}

/// The persisted deployed Safe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafeWallet {
    pub id: Uuid,
    pub address: Address,
    pub name: String,
    pub description: Option<String>,
    pub owners: Vec<Address>,
    pub threshold: u32,
    pub chain_id: u64,
    pub creator_user_id: String,
    pub source_record_id: Uuid,
    pub created_at: u64,
}

impl SafeWallet {
    /// The wallet a CONFIRMED record describes, or `None` without an address.
    pub fn from_record(record: &TransactionRecord) -> Option<Self> {
        let address = record.safe_address?;
        Some(Self {
            id: Uuid::new_v4(),
            address,
            name: record.params.name.clone(),
            description: record.params.description.clone(),
            owners: record.params.owners.clone(),
            threshold: record.params.threshold,
            chain_id: record.params.chain_id,
            creator_user_id: record.user_id.clone(),
            source_record_id: record.id,
            created_at: unix_now(),
        })
    }
}

/// Result of [`RecordStore::materialize_wallet`](crate::store::RecordStore::materialize_wallet).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaterializeOutcome {
    /// Wallet inserted and the record moved to PROCESSED.
    Created(SafeWallet),
    /// A wallet already existed for the address; nothing was written.
    AlreadyExists(SafeWallet),
}

/// What a proposal asks the Safe to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProposalKind {
    Transfer { to: Address, value: U256 },
    ContractCall { to: Address, value: U256, data: Bytes },
    AddOwner { owner: Address, threshold: u32 },
    RemoveOwner { owner: Address, threshold: u32 },
    ChangeThreshold { threshold: u32 },
}

impl ProposalKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Transfer { .. } => "transfer",
            Self::ContractCall { .. } => "contract_call",
            Self::AddOwner { .. } => "add_owner",
            Self::RemoveOwner { .. } => "remove_owner",
            Self::ChangeThreshold { .. } => "change_threshold",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    Pending,
    Executed,
}

/// A Safe transaction awaiting owner signatures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: Uuid,
    pub safe_address: Address,
    pub kind: ProposalKind,
    pub required_signatures: u32,
    pub current_signatures: u32,
    pub status: ProposalStatus,
    /// Safe nonce the target hash was computed for.
    pub nonce: Option<u64>,
    pub target_hash: Option<B256>,
    pub execution_tx_hash: Option<TxHash>,
    pub created_at: u64,
}

impl Proposal {
    pub fn new(safe_address: Address, kind: ProposalKind, required_signatures: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            safe_address,
            kind,
            required_signatures,
            current_signatures: 0,
            status: ProposalStatus::Pending,
            nonce: None,
            target_hash: None,
            execution_tx_hash: None,
            created_at: unix_now(),
        }
    }

    pub fn is_executed(&self) -> bool {
        self.status == ProposalStatus::Executed
    }
}

/// One owner's approval of a proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRecord {
    pub id: Uuid,
    pub proposal_id: Uuid,
    /// Owner expected to have produced the signature.
    pub signer: Address,
    /// 65-byte `r ∥ s ∥ v`, hex with optional `0x`.
    pub signature: String,
    pub scheme: String,
    pub is_valid: bool,
    /// Safe nonce in effect when signed.
    pub nonce: u64,
    pub target_hash: B256,
    pub created_at: u64,
}

impl SignatureRecord {
    pub fn new(proposal_id: Uuid, signer: Address, signature: impl Into<String>, nonce: u64, target_hash: B256) -> Self {
        Self {
            id: Uuid::new_v4(),
            proposal_id,
            signer,
            signature: signature.into(),
            scheme: "eip712".to_string(),
            is_valid: true,
            nonce,
            target_hash,
            created_at: unix_now(),
        }
    }
}
