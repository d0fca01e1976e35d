//! Worker loop: sweeps and catalog refreshes on their intervals until shutdown.

mod common;

use chrono::Utc;
use common::{collection_bytes, program_account, transfer_detail, FakeMetadataSource, MockLedger};
use ledger_settlement::catalog::{CacheDomains, CatalogService, FixedWindowLimiter};
use ledger_settlement::clock::ManualClock;
use ledger_settlement::config::CacheConfig;
use ledger_settlement::decoder::AccountDecoder;
use ledger_settlement::settlement::{MemoryStore, TransactionKind, TransactionStatus, TransactionTracker};
use ledger_settlement::types::Pubkey;
use ledger_settlement::worker::SettlementWorker;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

#[tokio::test(start_paused = true)]
async fn test_worker_sweeps_until_shutdown() {
    let program_id = Pubkey::new_unique();
    let ledger = Arc::new(MockLedger::new());
    ledger.add_program_account(program_account(
        &program_id,
        collection_bytes(&Pubkey::new_unique(), &Pubkey::new_unique(), "Acme", "ACM", "https://meta.example/acme.json"),
    ));
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));

    let tracker = Arc::new(TransactionTracker::new(ledger.clone(), store.clone(), store.clone(), clock.clone()));
    let catalog = Arc::new(CatalogService::new(
        program_id,
        ledger.clone(),
        Arc::new(FakeMetadataSource::with_documents(vec![(
            "https://meta.example/acme.json",
            json!({ "name": "Acme" }),
        )])),
        AccountDecoder::default(),
        CacheDomains::new(&CacheConfig::default(), clock),
        FixedWindowLimiter::new(10, Duration::from_millis(100)),
    ));

    tracker
        .create("task-1", "SIG1", TransactionKind::Transfer, json!({}), None)
        .await
        .unwrap();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let worker = SettlementWorker::new(
        tracker.clone(),
        catalog,
        Duration::from_secs(30),
        Duration::from_secs(60),
    );
    let handle = tokio::spawn(worker.run(async {
        let _ = stop_rx.await;
    }));

    // First ticks fire immediately: one sweep (not yet on the ledger) and one scan
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(
        tracker.find("SIG1").await.unwrap().unwrap().status,
        TransactionStatus::Confirming
    );
    assert_eq!(ledger.scans(), 1);

    ledger.set_transaction("SIG1", transfer_detail(10, "payer", 1));
    ledger.set_current_slot(20);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(
        tracker.find("SIG1").await.unwrap().unwrap().status,
        TransactionStatus::Confirmed
    );
    // Catalog is still fresh on the manual clock
    assert_eq!(ledger.scans(), 1);

    stop_tx.send(()).unwrap();
    handle.await.unwrap();
}
