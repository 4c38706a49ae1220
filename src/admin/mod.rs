//! Operator-facing admin API.
//!
//! # Endpoints
//! - `GET /admin/status`: version, chain and uptime
//! - `GET /admin/summary`: record counts by status
//! - `GET /admin/transactions/{tx_hash}`: one tracked record
//! - `POST /admin/transactions`: register a submitted Safe creation
//! - `POST /admin/proposals`: create a proposal
//! - `GET /admin/proposals/{id}`: one proposal
//! - `POST /admin/proposals/{id}/prepare`: nonce and hash owners must sign
//! - `POST /admin/proposals/{id}/signatures`: add an owner signature
//! - `POST /admin/proposals/{id}/execute`: submit `execTransaction`
//!
//! Every route requires `Authorization: Bearer <admin.api_key>`.

pub mod auth;
pub mod commands;
pub mod handlers;

use alloy::primitives::Address;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;

use crate::execution::TransactionSubmitter;
use crate::lifecycle::ShutdownSignal;
use crate::reconciler::ReconciliationEngine;
use crate::store::RecordStore;

use self::auth::admin_auth_middleware;
use self::commands::*;
use self::handlers::*;

/// Shared state for admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub store: Arc<dyn RecordStore>,
    pub engine: ReconciliationEngine,
    pub submitter: TransactionSubmitter,
    pub api_key: Arc<str>,
    pub chain_id: u64,
    pub factory: Address,
    pub started_at: Instant,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/summary", get(get_summary))
        .route("/admin/transactions", post(register_submission))
        .route("/admin/transactions/{tx_hash}", get(get_transaction))
        .route("/admin/proposals", post(create_proposal))
        .route("/admin/proposals/{id}", get(get_proposal))
        .route("/admin/proposals/{id}/prepare", post(prepare_proposal))
        .route("/admin/proposals/{id}/signatures", post(submit_signature))
        .route("/admin/proposals/{id}/execute", post(execute_proposal))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the admin router until shutdown.
pub async fn serve(addr: SocketAddr, state: AdminState, mut shutdown: ShutdownSignal) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, "Admin API listening");

    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
