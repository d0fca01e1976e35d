//! Marketplace catalog: program scan, decode fan-out and the cache domains in
//! front of them.

pub mod cache;
pub mod scan;
pub mod metadata;
pub mod batch;

pub use batch::{spawn_batch, BatchHandle, BatchProgress, BatchReport, FixedWindowLimiter};
pub use cache::{CacheDomains, CacheEntry, TtlCache};
pub use metadata::{HttpMetadataSource, MetadataSource};
pub use scan::{AccountScanner, Catalog};

use crate::clock::Clock;
use crate::config::ServiceConfig;
use crate::decoder::{AccountDecoder, CollectionRecord, ItemTypeRecord};
use crate::ledger::Ledger;
use crate::types::Pubkey;
use anyhow::Result;
use std::sync::Arc;
use tracing::{info, instrument};

/// Cached read access to the decoded marketplace state.
pub struct CatalogService {
    program_id: Pubkey,
    scanner: AccountScanner,
    metadata_source: Arc<dyn MetadataSource>,
    caches: CacheDomains,
    limiter: FixedWindowLimiter,
}

impl CatalogService {
    pub fn new(
        program_id: Pubkey,
        ledger: Arc<dyn Ledger>,
        metadata_source: Arc<dyn MetadataSource>,
        decoder: AccountDecoder,
        caches: CacheDomains,
        limiter: FixedWindowLimiter,
    ) -> Self {
        Self {
            program_id,
            scanner: AccountScanner::new(ledger, decoder),
            metadata_source,
            caches,
            limiter,
        }
    }

    pub fn from_config(
        config: &ServiceConfig,
        ledger: Arc<dyn Ledger>,
        metadata_source: Arc<dyn MetadataSource>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        Ok(Self::new(
            config.program_id()?,
            ledger,
            metadata_source,
            AccountDecoder::new(config.decoder),
            CacheDomains::new(&config.cache, clock),
            FixedWindowLimiter::from_config(&config.batch),
        ))
    }

    pub fn program_id(&self) -> &Pubkey {
        &self.program_id
    }

    /// Decoded program state, rescanned once the catalog TTL has elapsed.
    pub async fn catalog(&self) -> Result<Arc<Catalog>> {
        self.caches
            .catalog
            .get_or_refresh(self.program_id, || self.scanner.scan(&self.program_id))
            .await
    }

    /// Rescans if the catalog entry is missing or expired. Returns whether a scan ran.
    #[instrument(skip(self))]
    pub async fn refresh_if_expired(&self) -> Result<bool> {
        if !self.caches.catalog.is_expired(&self.program_id).await {
            return Ok(false);
        }
        let catalog = self.catalog().await?;
        info!(
            collections = catalog.collections.len(),
            item_types = catalog.item_types.len(),
            "Catalog rebuilt"
        );
        Ok(true)
    }

    pub async fn collections(&self) -> Result<Vec<CollectionRecord>> {
        Ok(self.catalog().await?.collections.clone())
    }

    pub async fn collection(&self, address: &Pubkey) -> Result<Option<CollectionRecord>> {
        Ok(self.catalog().await?.collection(address).cloned())
    }

    /// Item types belonging to one collection.
    pub async fn collection_items(&self, collection: &Pubkey) -> Result<Arc<Vec<ItemTypeRecord>>> {
        self.caches
            .collection_items
            .get_or_refresh(*collection, || async {
                Ok(self.catalog().await?.items_of(collection))
            })
            .await
    }

    /// Collections administered by `wallet`.
    pub async fn wallet_collections(&self, wallet: &Pubkey) -> Result<Arc<Vec<CollectionRecord>>> {
        self.caches
            .wallet_collections
            .get_or_refresh(*wallet, || async {
                Ok(self.catalog().await?.collections_of(wallet))
            })
            .await
    }

    /// Off-chain JSON document behind `uri`.
    pub async fn metadata(&self, uri: &str) -> Result<Arc<serde_json::Value>> {
        self.caches
            .metadata
            .get_or_refresh(uri.to_string(), || self.metadata_source.fetch(uri))
            .await
    }

    /// Warms the metadata cache for every URI in a background task.
    pub fn load_metadata_batch(self: &Arc<Self>, uris: Vec<String>) -> BatchHandle {
        let service = Arc::clone(self);
        spawn_batch(uris, self.limiter, move |uri| {
            let service = Arc::clone(&service);
            async move { service.metadata(&uri).await.map(|_| ()) }
        })
    }

    /// Metadata URIs of every collection and item type in the current catalog.
    pub async fn catalog_uris(&self) -> Result<Vec<String>> {
        let catalog = self.catalog().await?;
        let mut uris: Vec<String> = catalog
            .collections
            .iter()
            .map(|collection| collection.uri.clone())
            .chain(catalog.item_types.iter().map(|item| item.uri.clone()))
            .filter(|uri| !uri.is_empty())
            .collect();
        uris.sort();
        uris.dedup();
        Ok(uris)
    }

    pub fn caches(&self) -> &CacheDomains {
        &self.caches
    }
}
