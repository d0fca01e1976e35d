//! Main entry point for the ledger-settlement service
//!
//! Usage: `ledger-settlement [config.json]`

use anyhow::{Context, Result};
use ledger_settlement::catalog::{CatalogService, HttpMetadataSource};
use ledger_settlement::clock::{Clock, SystemClock};
use ledger_settlement::config::ServiceConfig;
use ledger_settlement::ledger::{Ledger, RpcLedger};
use ledger_settlement::settlement::{SqliteStore, TransactionTracker};
use ledger_settlement::worker::SettlementWorker;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => ServiceConfig::from_file(&path)?,
        None => {
            let config = ServiceConfig::default();
            config.validate()?;
            config
        }
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(config.tracing_level()?)
        .init();

    info!("Starting ledger-settlement for program {}", config.program_id);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let ledger: Arc<dyn Ledger> = Arc::new(RpcLedger::new(&config.rpc)?);
    let store = SqliteStore::connect(&config.database_url)
        .await
        .context("Failed to open settlement store")?;
    let metadata_source = Arc::new(HttpMetadataSource::new(Duration::from_secs(
        config.batch.request_timeout_seconds,
    ))?);

    let catalog = Arc::new(CatalogService::from_config(
        &config,
        Arc::clone(&ledger),
        metadata_source,
        Arc::clone(&clock),
    )?);
    let tracker = Arc::new(
        TransactionTracker::new(ledger, store.clone(), store, clock)
            .with_default_required_confirmations(config.tracker.default_required_confirmations),
    );

    let worker = SettlementWorker::from_config(&config.tracker, tracker, catalog);
    worker
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await;

    info!("ledger-settlement shut down cleanly.");
    Ok(())
}
