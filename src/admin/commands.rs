use alloy::primitives::{Address, TxHash, B256};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::admin::AdminState;
use crate::execution::{ExecutionError, SignatureAggregator};
use crate::observability::metrics;
use crate::reconciler::ReconcileError;
use crate::store::{
    CreationParams, Proposal, ProposalKind, SignatureRecord, StoreError, TransactionRecord,
};

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

fn store_status(e: &StoreError) -> StatusCode {
    match e {
        StoreError::Duplicate(_) | StoreError::Conflict(_) => StatusCode::CONFLICT,
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Io(_) | StoreError::Serde(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl AdminError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Store(e) | Self::Reconcile(ReconcileError::Store(e)) => store_status(e),
            Self::Reconcile(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Execution(e) => match e {
                ExecutionError::ProposalNotFound(_) => StatusCode::NOT_FOUND,
                ExecutionError::AlreadyExecuted(_) => StatusCode::CONFLICT,
                ExecutionError::InsufficientSignatures { .. }
                | ExecutionError::NonceQuorum { .. }
                | ExecutionError::SignatureQuorum { .. }
                | ExecutionError::OwnerNotFound(_)
                | ExecutionError::InvalidProposal(_) => StatusCode::UNPROCESSABLE_ENTITY,
                ExecutionError::ExecutorUnavailable => StatusCode::SERVICE_UNAVAILABLE,
                ExecutionError::Chain(_) | ExecutionError::Submission(_) => StatusCode::BAD_GATEWAY,
                ExecutionError::Store(e) => store_status(e),
            },
        }
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Admin command failed");
        }
        let mut body = serde_json::json!({ "error": self.to_string() });
        if let Self::Execution(e) = &self {
            body["requires_resign"] = e.requires_resign().into();
        }
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterSubmission {
    pub tx_hash: TxHash,
    pub user_id: String,
    pub params: CreationParams,
}

/// Start tracking a Safe creation the user has broadcast.
pub async fn register_submission(
    State(state): State<AdminState>,
    Json(req): Json<RegisterSubmission>,
) -> Result<(StatusCode, Json<TransactionRecord>), AdminError> {
    if req.user_id.trim().is_empty() {
        return Err(AdminError::BadRequest("user_id must not be empty".to_string()));
    }
    let params = &req.params;
    if params.owners.is_empty() {
        return Err(AdminError::BadRequest("owners must not be empty".to_string()));
    }
    if params.threshold == 0 || params.threshold as usize > params.owners.len() {
        return Err(AdminError::BadRequest(format!(
            "threshold must be between 1 and {}",
            params.owners.len()
        )));
    }
    if params.chain_id != state.chain_id {
        return Err(AdminError::BadRequest(format!(
            "chain_id {} does not match {}",
            params.chain_id, state.chain_id
        )));
    }

    let record = TransactionRecord::new(req.tx_hash, req.user_id, req.params);
    state.engine.register_submission(record.clone()).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

#[derive(Debug, Deserialize)]
pub struct CreateProposal {
    pub safe_address: Address,
    pub kind: ProposalKind,
    pub required_signatures: u32,
}

pub async fn create_proposal(
    State(state): State<AdminState>,
    Json(req): Json<CreateProposal>,
) -> Result<(StatusCode, Json<Proposal>), AdminError> {
    if req.required_signatures == 0 {
        return Err(AdminError::BadRequest("required_signatures must be > 0".to_string()));
    }
    let proposal = Proposal::new(req.safe_address, req.kind, req.required_signatures);
    state.store.insert_proposal(proposal.clone()).await?;
    tracing::info!(
        proposal_id = %proposal.id,
        safe = %proposal.safe_address,
        kind = proposal.kind.name(),
        "Proposal created"
    );
    Ok((StatusCode::CREATED, Json(proposal)))
}

pub async fn get_proposal(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Proposal>, AdminError> {
    state
        .store
        .get_proposal(id)
        .await?
        .map(Json)
        .ok_or(AdminError::Execution(ExecutionError::ProposalNotFound(id)))
}

#[derive(Debug, Serialize)]
pub struct SigningTarget {
    pub nonce: u64,
    pub target_hash: B256,
}

/// Compute what owners must sign at the Safe's current nonce.
pub async fn prepare_proposal(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SigningTarget>, AdminError> {
    let prepared = state.submitter.prepare(id).await?;
    Ok(Json(SigningTarget {
        nonce: prepared.nonce,
        target_hash: prepared.target_hash,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SubmitSignature {
    pub signer: Address,
    pub signature: String,
    /// Defaults to the nonce the proposal was last prepared at.
    #[serde(default)]
    pub nonce: Option<u64>,
    #[serde(default)]
    pub target_hash: Option<B256>,
}

/// Accept one owner's signature; it must recover to `signer`.
pub async fn submit_signature(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SubmitSignature>,
) -> Result<(StatusCode, Json<SignatureRecord>), AdminError> {
    let proposal = state
        .store
        .get_proposal(id)
        .await?
        .ok_or(ExecutionError::ProposalNotFound(id))?;
    if proposal.is_executed() {
        return Err(ExecutionError::AlreadyExecuted(id).into());
    }

    let (nonce, target_hash) = match (req.nonce.or(proposal.nonce), req.target_hash.or(proposal.target_hash)) {
        (Some(nonce), Some(hash)) => (nonce, hash),
        _ => {
            return Err(AdminError::BadRequest(
                "proposal has not been prepared; nonce and target_hash are required".to_string(),
            ))
        }
    };

    if let Err(defect) = SignatureAggregator::verify(target_hash, req.signer, &req.signature) {
        metrics::record_signature_rejected(defect.reason());
        return Err(AdminError::BadRequest(format!("signature rejected: {defect}")));
    }

    let record = SignatureRecord::new(id, req.signer, req.signature, nonce, target_hash);
    state.store.insert_signature(record.clone()).await?;
    tracing::info!(proposal_id = %id, signer = %record.signer, nonce, "Signature accepted");
    Ok((StatusCode::CREATED, Json(record)))
}

#[derive(Debug, Serialize)]
pub struct ExecutionReceipt {
    pub proposal_id: Uuid,
    pub tx_hash: TxHash,
}

pub async fn execute_proposal(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ExecutionReceipt>, AdminError> {
    let tx_hash = state.submitter.execute(id).await?;
    Ok(Json(ExecutionReceipt {
        proposal_id: id,
        tx_hash,
    }))
}
