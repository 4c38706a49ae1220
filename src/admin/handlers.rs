use alloy::primitives::TxHash;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::admin::AdminState;
use crate::store::{StoreError, TransactionRecord};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub chain_id: u64,
    pub factory: String,
    pub uptime_secs: u64,
}

#[derive(Serialize)]
pub struct RecordSummary {
    pub total: usize,
    pub by_status: BTreeMap<&'static str, usize>,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        chain_id: state.chain_id,
        factory: state.factory.to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

pub async fn get_summary(State(state): State<AdminState>) -> Result<Json<RecordSummary>, StatusCode> {
    let counts = state.store.status_counts().await.map_err(internal)?;
    Ok(Json(RecordSummary {
        total: counts.values().sum(),
        by_status: counts.into_iter().map(|(s, n)| (s.as_str(), n)).collect(),
    }))
}

pub async fn get_transaction(
    State(state): State<AdminState>,
    Path(tx_hash): Path<String>,
) -> Result<Json<TransactionRecord>, StatusCode> {
    let tx_hash: TxHash = tx_hash.parse().map_err(|_| StatusCode::BAD_REQUEST)?;
    state
        .store
        .get_record_by_hash(tx_hash)
        .await
        .map_err(internal)?
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

fn internal(e: StoreError) -> StatusCode {
    tracing::error!(error = %e, "Admin store query failed");
    StatusCode::INTERNAL_SERVER_ERROR
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::setup_admin_router;
    use crate::blockchain::{BlockchainClient, BlockchainConfig};
    use crate::config::ReconcilerConfig;
    use crate::execution::TransactionSubmitter;
    use crate::notifications::LogSink;
    use crate::reconciler::ReconciliationEngine;
    use crate::resilience::RetryPolicy;
    use crate::store::{CreationParams, InMemoryStore, RecordStore};
    use alloy::primitives::Address;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::sync::Arc;
    use std::time::Instant;
    use tower::ServiceExt;

    const KEY: &str = "test-admin-key-0123456789";

    async fn state() -> AdminState {
        let store = Arc::new(InMemoryStore::new(None));
        store
            .create_record(TransactionRecord::new(
                TxHash::repeat_byte(0x11),
                "user-1",
                CreationParams {
                    name: "Ops".to_string(),
                    description: None,
                    owners: vec![Address::repeat_byte(0xaa)],
                    threshold: 1,
                    chain_id: 1,
                },
            ))
            .await
            .unwrap();
        // Read routes never reach the chain; the client is never called.
        let chain = Arc::new(BlockchainClient::new(BlockchainConfig::default(), RetryPolicy::none()).unwrap());
        let factory = Address::repeat_byte(0xfa);
        let engine = ReconciliationEngine::new(
            chain.clone(),
            store.clone(),
            Arc::new(LogSink),
            factory,
            0,
            ReconcilerConfig::default(),
        );
        let submitter = TransactionSubmitter::new(chain, store.clone(), 1, RetryPolicy::none());
        AdminState {
            store,
            engine,
            submitter,
            api_key: Arc::from(KEY),
            chain_id: 1,
            factory,
            started_at: Instant::now(),
        }
    }

    fn get(uri: &str, key: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(key) = key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json(res: axum::response::Response) -> serde_json::Value {
        let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_requires_bearer_key() {
        let app = setup_admin_router(state().await);
        let res = app.clone().oneshot(get("/admin/status", None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = app.oneshot(get("/admin/status", Some("wrong"))).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_status() {
        let app = setup_admin_router(state().await);
        let res = app.oneshot(get("/admin/status", Some(KEY))).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = json(res).await;
        assert_eq!(body["status"], "operational");
        assert_eq!(body["chain_id"], 1);
    }

    #[tokio::test]
    async fn test_summary_counts() {
        let app = setup_admin_router(state().await);
        let res = app.oneshot(get("/admin/summary", Some(KEY))).await.unwrap();
        let body = json(res).await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["by_status"]["SUBMITTED"], 1);
        assert_eq!(body["by_status"]["FAILED"], 0);
    }

    #[tokio::test]
    async fn test_transaction_lookup() {
        let app = setup_admin_router(state().await);
        let hash = TxHash::repeat_byte(0x11).to_string();

        let res = app
            .clone()
            .oneshot(get(&format!("/admin/transactions/{}", hash), Some(KEY)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(json(res).await["status"], "SUBMITTED");

        let missing = TxHash::repeat_byte(0x22).to_string();
        let res = app
            .clone()
            .oneshot(get(&format!("/admin/transactions/{}", missing), Some(KEY)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let res = app
            .oneshot(get("/admin/transactions/not-a-hash", Some(KEY)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
