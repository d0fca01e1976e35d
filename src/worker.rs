//! Background worker: periodic settlement sweeps and catalog refreshes.

use crate::catalog::{BatchHandle, CatalogService};
use crate::config::TrackerConfig;
use crate::settlement::TransactionTracker;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

pub struct SettlementWorker {
    tracker: Arc<TransactionTracker>,
    catalog: Arc<CatalogService>,
    sweep_interval: Duration,
    refresh_interval: Duration,
    metadata_batch: Option<BatchHandle>,
}

const MIN_INTERVAL: Duration = Duration::from_millis(1);

impl SettlementWorker {
    pub fn new(
        tracker: Arc<TransactionTracker>,
        catalog: Arc<CatalogService>,
        sweep_interval: Duration,
        refresh_interval: Duration,
    ) -> Self {
        // tokio intervals must be non-zero
        Self {
            tracker,
            catalog,
            sweep_interval: sweep_interval.max(MIN_INTERVAL),
            refresh_interval: refresh_interval.max(MIN_INTERVAL),
            metadata_batch: None,
        }
    }

    pub fn from_config(config: &TrackerConfig, tracker: Arc<TransactionTracker>, catalog: Arc<CatalogService>) -> Self {
        Self::new(
            tracker,
            catalog,
            Duration::from_secs(config.sweep_interval_seconds),
            Duration::from_secs(config.catalog_refresh_interval_seconds),
        )
    }

    /// Main execution loop. Runs until `shutdown` resolves.
    pub async fn run<S>(mut self, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        info!("SettlementWorker is running...");
        tokio::pin!(shutdown);

        let mut sweep_tick = interval(self.sweep_interval);
        sweep_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut refresh_tick = interval(self.refresh_interval);
        refresh_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("SettlementWorker received shutdown signal.");
                    break;
                }
                _ = sweep_tick.tick() => {
                    if let Err(e) = self.tracker.sweep().await {
                        error!("Settlement sweep failed: {}", e);
                    }
                }
                _ = refresh_tick.tick() => {
                    self.refresh_catalog().await;
                }
            }
        }

        if let Some(batch) = self.metadata_batch.take() {
            batch.abort();
        }
        info!("SettlementWorker stopped.");
    }

    /// Rebuilds an expired catalog and warms metadata for it in the background.
    async fn refresh_catalog(&mut self) {
        match self.catalog.refresh_if_expired().await {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                warn!("Catalog refresh failed: {}", e);
                return;
            }
        }

        if self.metadata_batch.as_ref().is_some_and(|batch| !batch.is_finished()) {
            info!("Previous metadata batch still running, skipping warm-up");
            return;
        }

        match self.catalog.catalog_uris().await {
            Ok(uris) if !uris.is_empty() => {
                info!("Warming metadata for {} URIs", uris.len());
                self.metadata_batch = Some(self.catalog.load_metadata_batch(uris));
            }
            Ok(_) => {}
            Err(e) => warn!("Could not list catalog URIs: {}", e),
        }
    }
}
