//! Reconciliation engine tests against an in-process chain.

use alloy::primitives::{Address, TxHash};
use std::sync::Arc;
use std::time::Duration;

use safe_coordinator::config::ReconcilerConfig;
use safe_coordinator::lifecycle::Shutdown;
use safe_coordinator::notifications::{ChannelSink, LogSink, NotificationSink};
use safe_coordinator::reconciler::{ReconcileError, ReconciliationEngine, Transition};
use safe_coordinator::store::{
    InMemoryStore, MaterializeOutcome, RecordStore, SafeWallet, StoreError, TxStatus,
};

mod common;
use common::{creation_log, creation_receipt, factory, submission, MockChain};

struct Harness {
    chain: Arc<MockChain>,
    store: Arc<InMemoryStore>,
    engine: ReconciliationEngine,
}

fn harness_with(sink: Arc<dyn NotificationSink>, confirmation_blocks: u32, config: ReconcilerConfig) -> Harness {
    let chain = Arc::new(MockChain::new());
    let store = Arc::new(InMemoryStore::new(None));
    let engine = ReconciliationEngine::new(
        chain.clone(),
        store.clone(),
        sink,
        factory(),
        confirmation_blocks,
        config,
    );
    Harness { chain, store, engine }
}

fn harness() -> Harness {
    harness_with(Arc::new(LogSink), 0, ReconcilerConfig::default())
}

async fn status(store: &InMemoryStore, tx_hash: TxHash) -> TxStatus {
    store.get_record_by_hash(tx_hash).await.unwrap().unwrap().status
}

#[tokio::test]
async fn test_poll_confirm_materialize_complete() {
    let sink = ChannelSink::new(16);
    let mut notifications = sink.subscribe();
    let h = harness_with(Arc::new(sink), 0, ReconcilerConfig::default());

    let record = submission(1);
    let tx_hash = record.tx_hash;
    let safe = Address::repeat_byte(0x5a);
    h.engine.register_submission(record.clone()).await.unwrap();

    // Not mined yet: nothing happens.
    let summary = h.engine.poller().tick().await.unwrap();
    assert_eq!(summary.checked, 1);
    assert_eq!(status(&h.store, tx_hash).await, TxStatus::Submitted);

    h.chain.add_receipt(tx_hash, creation_receipt(tx_hash, safe, 90));
    let summary = h.engine.poller().tick().await.unwrap();
    assert_eq!(summary.confirmed, 1);

    let confirmed = h.store.get_record_by_hash(tx_hash).await.unwrap().unwrap();
    assert_eq!(confirmed.status, TxStatus::Confirmed);
    assert_eq!(confirmed.safe_address, Some(safe));
    assert_eq!(confirmed.block_number, Some(90));
    assert_eq!(confirmed.gas_used, Some(262_000));

    let summary = h.engine.materializer().tick().await.unwrap();
    assert_eq!(summary.created, 1);
    assert_eq!(summary.completed, 1);

    let completed = h.store.get_record_by_hash(tx_hash).await.unwrap().unwrap();
    assert_eq!(completed.status, TxStatus::Completed);
    assert!(completed.processed_at.is_some());

    let wallet = h.store.get_wallet(safe).await.unwrap().unwrap();
    assert_eq!(wallet.source_record_id, record.id);
    assert_eq!(wallet.owners, record.params.owners);
    assert_eq!(wallet.threshold, 2);
    assert_eq!(wallet.chain_id, common::CHAIN_ID);

    let (user, notification) = notifications.recv().await.unwrap();
    assert_eq!(user, record.user_id);
    assert_eq!(notification.kind, "safe_creation_update");
    assert_eq!(notification.data["status"], "COMPLETED");
    assert_eq!(notification.data["safe_name"], "Treasury 1");
    assert_eq!(notification.data["transaction_id"], record.id.to_string());

    // Re-running both loops changes nothing.
    let receipt_calls = h.chain.receipt_calls.load(std::sync::atomic::Ordering::SeqCst);
    let summary = h.engine.poller().tick().await.unwrap();
    assert_eq!(summary.checked, 0);
    let summary = h.engine.materializer().tick().await.unwrap();
    assert_eq!(summary.created + summary.completed, 0);
    assert_eq!(
        h.chain.receipt_calls.load(std::sync::atomic::Ordering::SeqCst),
        receipt_calls
    );
    assert_eq!(h.store.get_record_by_hash(tx_hash).await.unwrap().unwrap(), completed);
    assert!(notifications.try_recv().is_err());
}

#[tokio::test]
async fn test_subscriber_and_poller_race_once() {
    let h = harness();
    let record = submission(2);
    let tx_hash = record.tx_hash;
    let safe = Address::repeat_byte(0x5b);
    h.engine.register_submission(record).await.unwrap();
    h.chain.add_receipt(tx_hash, creation_receipt(tx_hash, safe, 95));

    let subscriber = h.engine.subscriber();
    let poller = h.engine.poller();
    let (pushed, polled) = tokio::join!(
        subscriber.handle_log(creation_log(tx_hash, safe, 95)),
        poller.tick()
    );

    let pushed = pushed.unwrap();
    let polled = polled.unwrap();
    let applied = usize::from(pushed.is_applied()) + polled.confirmed;
    assert_eq!(applied, 1);

    // A late duplicate is a no-op.
    let again = subscriber.handle_log(creation_log(tx_hash, safe, 95)).await.unwrap();
    assert_eq!(again, Transition::Skipped { current: TxStatus::Confirmed });

    h.engine.materializer().tick().await.unwrap();
    h.engine.materializer().tick().await.unwrap();
    let counts = h.store.status_counts().await.unwrap();
    assert_eq!(counts[&TxStatus::Completed], 1);
    assert!(h.store.get_wallet(safe).await.unwrap().is_some());
}

#[tokio::test]
async fn test_confirmation_depth_goes_through_pending() {
    let h = harness_with(Arc::new(LogSink), 3, ReconcilerConfig::default());
    let record = submission(3);
    let tx_hash = record.tx_hash;
    let safe = Address::repeat_byte(0x5c);
    h.engine.register_submission(record).await.unwrap();

    h.chain.add_receipt(tx_hash, creation_receipt(tx_hash, safe, 100));
    h.chain.set_head(101);

    let transition = h
        .engine
        .subscriber()
        .handle_log(creation_log(tx_hash, safe, 100))
        .await
        .unwrap();
    assert_eq!(
        transition,
        Transition::Applied {
            from: TxStatus::Submitted,
            to: TxStatus::Pending
        }
    );

    // Still shallow: stays PENDING.
    h.engine.poller().tick().await.unwrap();
    assert_eq!(status(&h.store, tx_hash).await, TxStatus::Pending);

    h.chain.set_head(103);
    let summary = h.engine.poller().tick().await.unwrap();
    assert_eq!(summary.confirmed, 1);
    let record = h.store.get_record_by_hash(tx_hash).await.unwrap().unwrap();
    assert_eq!(record.status, TxStatus::Confirmed);
    assert_eq!(record.safe_address, Some(safe));
}

#[tokio::test]
async fn test_reverted_receipt_fails_record() {
    let h = harness();
    let record = submission(4);
    let tx_hash = record.tx_hash;
    h.engine.register_submission(record).await.unwrap();

    let mut receipt = creation_receipt(tx_hash, Address::repeat_byte(0x5d), 90);
    receipt.status = false;
    h.chain.add_receipt(tx_hash, receipt);

    let summary = h.engine.poller().tick().await.unwrap();
    assert_eq!(summary.failed, 1);

    let record = h.store.get_record_by_hash(tx_hash).await.unwrap().unwrap();
    assert_eq!(record.status, TxStatus::Failed);
    assert_eq!(record.error_message.as_deref(), Some("on-chain execution failed"));
    assert_eq!(record.retry_count, 1);
    assert!(record.safe_address.is_none());
}

#[tokio::test]
async fn test_receipt_without_creation_event_fails_record() {
    let h = harness();
    let record = submission(5);
    let tx_hash = record.tx_hash;
    h.engine.register_submission(record).await.unwrap();

    let mut receipt = creation_receipt(tx_hash, Address::repeat_byte(0x5e), 90);
    // Same event from some other contract does not count.
    receipt.logs[0].address = Address::repeat_byte(0x01);
    h.chain.add_receipt(tx_hash, receipt);

    h.engine.poller().tick().await.unwrap();
    let record = h.store.get_record_by_hash(tx_hash).await.unwrap().unwrap();
    assert_eq!(record.status, TxStatus::Failed);
    assert_eq!(record.error_message.as_deref(), Some("no creation event in receipt"));
}

#[tokio::test]
async fn test_unmined_submission_times_out() {
    let config = ReconcilerConfig {
        submission_timeout_secs: 0,
        ..ReconcilerConfig::default()
    };
    let h = harness_with(Arc::new(LogSink), 0, config);
    let record = submission(6);
    let tx_hash = record.tx_hash;
    h.engine.register_submission(record).await.unwrap();

    h.engine.poller().tick().await.unwrap();
    let record = h.store.get_record_by_hash(tx_hash).await.unwrap().unwrap();
    assert_eq!(record.status, TxStatus::Failed);
    assert_eq!(
        record.error_message.as_deref(),
        Some("transaction not mined within timeout")
    );
}

#[tokio::test]
async fn test_duplicate_registration_rejected() {
    let h = harness();
    h.engine.register_submission(submission(7)).await.unwrap();
    let err = h.engine.register_submission(submission(7)).await.unwrap_err();
    assert!(matches!(err, ReconcileError::Store(StoreError::Duplicate(_))));
}

#[tokio::test]
async fn test_subscriber_skips_removed_and_unknown_logs() {
    let h = harness();
    let record = submission(8);
    let tx_hash = record.tx_hash;
    let safe = Address::repeat_byte(0x5f);
    h.engine.register_submission(record).await.unwrap();
    h.chain.add_receipt(tx_hash, creation_receipt(tx_hash, safe, 90));
    let subscriber = h.engine.subscriber();

    let mut removed = creation_log(tx_hash, safe, 90);
    removed.removed = true;
    assert_eq!(subscriber.handle_log(removed).await.unwrap(), Transition::Missing);

    let unknown = creation_log(TxHash::repeat_byte(0xee), safe, 90);
    assert_eq!(subscriber.handle_log(unknown).await.unwrap(), Transition::Missing);

    let mut malformed = creation_log(tx_hash, safe, 90);
    malformed.data = alloy::primitives::Bytes::from(vec![0xffu8; 64]);
    assert!(matches!(
        subscriber.handle_log(malformed).await,
        Err(ReconcileError::CreationLog(_))
    ));

    assert_eq!(status(&h.store, tx_hash).await, TxStatus::Submitted);
}

#[tokio::test]
async fn test_materializer_purges_old_failures() {
    let h = harness();
    let mut old = submission(9);
    old.created_at = 1_000;
    let old_hash = old.tx_hash;
    h.engine.register_submission(old).await.unwrap();
    h.store
        .update_status(
            old_hash,
            &[TxStatus::Submitted],
            safe_coordinator::store::StatusUpdate::failed("on-chain execution failed"),
        )
        .await
        .unwrap();

    let summary = h.engine.materializer().tick().await.unwrap();
    assert_eq!(summary.purged, 1);
    assert!(h.store.get_record_by_hash(old_hash).await.unwrap().is_none());
}

#[tokio::test]
async fn test_notification_failure_keeps_completion() {
    // A channel sink with no receivers rejects every publish.
    let h = harness_with(Arc::new(ChannelSink::new(4)), 0, ReconcilerConfig::default());
    let record = submission(10);
    let tx_hash = record.tx_hash;
    h.engine.register_submission(record).await.unwrap();
    h.chain
        .add_receipt(tx_hash, creation_receipt(tx_hash, Address::repeat_byte(0x60), 90));

    h.engine.poller().tick().await.unwrap();
    let summary = h.engine.materializer().tick().await.unwrap();
    assert_eq!(summary.errors, 0);
    assert_eq!(status(&h.store, tx_hash).await, TxStatus::Completed);
}

#[tokio::test]
async fn test_engine_loops_confirm_via_subscription() {
    let config = ReconcilerConfig {
        // Keep the poller out of the way.
        poll_interval_secs: 3600,
        materialize_interval_secs: 1,
        resubscribe_base_ms: 10,
        resubscribe_max_ms: 50,
        ..ReconcilerConfig::default()
    };
    let h = harness_with(Arc::new(LogSink), 0, config);
    h.chain
        .subscribe_failures
        .store(2, std::sync::atomic::Ordering::SeqCst);

    let record = submission(11);
    let tx_hash = record.tx_hash;
    let safe = Address::repeat_byte(0x61);
    h.engine.register_submission(record).await.unwrap();

    let shutdown = Shutdown::new();
    let handle = h.engine.spawn(&shutdown);
    assert_eq!(handle.task_names(), vec!["subscriber", "poller", "materializer"]);

    // Two failed attempts, then a live subscription.
    let chain = h.chain.clone();
    assert!(
        common::eventually(Duration::from_secs(5), || {
            let chain = chain.clone();
            async move { chain.subscriptions.load(std::sync::atomic::Ordering::SeqCst) == 1 }
        })
        .await
    );

    // The stream dies and comes back.
    h.chain.drop_subscription();
    assert!(
        common::eventually(Duration::from_secs(5), || {
            let chain = chain.clone();
            async move { chain.subscriptions.load(std::sync::atomic::Ordering::SeqCst) == 2 }
        })
        .await
    );

    h.chain.add_receipt(tx_hash, creation_receipt(tx_hash, safe, 90));
    assert!(h.chain.push_log(creation_log(tx_hash, safe, 90)));

    let store = h.store.clone();
    assert!(
        common::eventually(Duration::from_secs(5), || {
            let store = store.clone();
            async move { status(&store, tx_hash).await == TxStatus::Completed }
        })
        .await
    );

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), handle.join())
        .await
        .expect("engine did not stop");
}

#[tokio::test]
async fn test_shared_address_materializes_one_wallet() {
    let sink = ChannelSink::new(16);
    let mut notifications = sink.subscribe();
    let h = harness_with(Arc::new(sink), 0, ReconcilerConfig::default());

    let safe = Address::repeat_byte(0x6c);
    let first = submission(12);
    let second = submission(13);
    for record in [&first, &second] {
        h.engine.register_submission(record.clone()).await.unwrap();
        h.chain
            .add_receipt(record.tx_hash, creation_receipt(record.tx_hash, safe, 90));
    }

    let summary = h.engine.poller().tick().await.unwrap();
    assert_eq!(summary.confirmed, 2);

    let summary = h.engine.materializer().tick().await.unwrap();
    assert_eq!(summary.created, 1);
    assert_eq!(summary.existing, 1);
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.errors, 0);

    assert_eq!(status(&h.store, first.tx_hash).await, TxStatus::Completed);
    assert_eq!(status(&h.store, second.tx_hash).await, TxStatus::Completed);

    // Only the record that created the wallet notifies its owner.
    let wallet = h.store.get_wallet(safe).await.unwrap().unwrap();
    let (user, notification) = notifications.recv().await.unwrap();
    let source = if wallet.source_record_id == first.id { &first } else { &second };
    assert_eq!(user, source.user_id);
    assert_eq!(notification.data["transaction_id"], source.id.to_string());
    assert!(notifications.try_recv().is_err());

    let summary = h.engine.materializer().tick().await.unwrap();
    assert_eq!(summary.created + summary.existing + summary.completed, 0);
}

#[tokio::test]
async fn test_materializer_resumes_processed_record() {
    let sink = ChannelSink::new(16);
    let mut notifications = sink.subscribe();
    let h = harness_with(Arc::new(sink), 0, ReconcilerConfig::default());

    let record = submission(14);
    let tx_hash = record.tx_hash;
    let safe = Address::repeat_byte(0x6d);
    h.engine.register_submission(record.clone()).await.unwrap();
    h.chain.add_receipt(tx_hash, creation_receipt(tx_hash, safe, 90));
    h.engine.poller().tick().await.unwrap();

    // Wallet written, then the process stopped before COMPLETED.
    let confirmed = h.store.get_record_by_hash(tx_hash).await.unwrap().unwrap();
    let wallet = SafeWallet::from_record(&confirmed).unwrap();
    let outcome = h.store.materialize_wallet(tx_hash, wallet).await.unwrap();
    assert!(matches!(outcome, MaterializeOutcome::Created(_)));
    assert_eq!(status(&h.store, tx_hash).await, TxStatus::Processed);

    let summary = h.engine.materializer().tick().await.unwrap();
    assert_eq!(summary.created, 0);
    assert_eq!(summary.existing, 0);
    assert_eq!(summary.completed, 1);
    assert_eq!(status(&h.store, tx_hash).await, TxStatus::Completed);

    let (user, notification) = notifications.recv().await.unwrap();
    assert_eq!(user, record.user_id);
    assert_eq!(notification.data["status"], "COMPLETED");
    assert_eq!(notification.data["safe_address"], serde_json::json!(safe));
}

#[tokio::test]
async fn test_poll_error_is_recorded_and_pass_continues() {
    let h = harness();
    let broken = submission(15);
    let healthy = submission(16);
    let safe = Address::repeat_byte(0x6e);
    h.engine.register_submission(broken.clone()).await.unwrap();
    h.engine.register_submission(healthy.clone()).await.unwrap();
    h.chain.receipt_errors.lock().unwrap().insert(broken.tx_hash);
    h.chain
        .add_receipt(healthy.tx_hash, creation_receipt(healthy.tx_hash, safe, 90));

    let summary = h.engine.poller().tick().await.unwrap();
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.confirmed, 1);

    let record = h.store.get_record_by_hash(broken.tx_hash).await.unwrap().unwrap();
    assert_eq!(record.status, TxStatus::Submitted);
    assert!(record.error_message.unwrap().contains("header not found"));
    assert_eq!(status(&h.store, healthy.tx_hash).await, TxStatus::Confirmed);
}
