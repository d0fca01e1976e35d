//! Time-to-live cache over moka, with expiry judged by an injected clock.
//!
//! Entries are replaced wholesale on the first read after their TTL elapses.
//! A failed refresh leaves the previous entry in place and is returned to the
//! caller; there is no negative caching and no stale fallback.

use crate::catalog::scan::Catalog;
use crate::clock::Clock;
use crate::config::CacheConfig;
use crate::decoder::{CollectionRecord, ItemTypeRecord};
use crate::types::Pubkey;
use anyhow::Result;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A cached value and the moment it was computed.
#[derive(Debug)]
pub struct CacheEntry<V> {
    pub value: Arc<V>,
    pub captured_at: DateTime<Utc>,
}

impl<V> Clone for CacheEntry<V> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            captured_at: self.captured_at,
        }
    }
}

pub struct TtlCache<K, V> {
    name: &'static str,
    entries: Cache<K, CacheEntry<V>>,
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub fn new(name: &'static str, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            name,
            entries: Cache::builder().name(name).build(),
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
            clock,
        }
    }

    pub fn ttl(&self) -> chrono::Duration {
        self.ttl
    }

    fn is_fresh(&self, entry: &CacheEntry<V>) -> bool {
        self.clock.now() - entry.captured_at < self.ttl
    }

    /// Raw entry, fresh or not.
    pub async fn entry(&self, key: &K) -> Option<CacheEntry<V>> {
        self.entries.get(key).await
    }

    /// Value for `key` if it is still within its TTL.
    pub async fn get(&self, key: &K) -> Option<Arc<V>> {
        self.entries
            .get(key)
            .await
            .filter(|entry| self.is_fresh(entry))
            .map(|entry| entry.value)
    }

    /// Returns the cached value, or runs `refresh` and stores its result.
    pub async fn get_or_refresh<F, Fut>(&self, key: K, refresh: F) -> Result<Arc<V>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        if let Some(value) = self.get(&key).await {
            debug!(cache = self.name, ?key, "cache hit");
            return Ok(value);
        }

        debug!(cache = self.name, ?key, "cache miss, recomputing");
        let value = Arc::new(refresh().await?);
        self.insert(key, Arc::clone(&value)).await;
        Ok(value)
    }

    pub async fn insert(&self, key: K, value: Arc<V>) {
        let entry = CacheEntry {
            value,
            captured_at: self.clock.now(),
        };
        self.entries.insert(key, entry).await;
    }

    /// Whether the entry for `key` is missing or past its TTL.
    pub async fn is_expired(&self, key: &K) -> bool {
        match self.entries.get(key).await {
            Some(entry) => !self.is_fresh(&entry),
            None => true,
        }
    }

    pub async fn invalidate(&self, key: &K) {
        self.entries.invalidate(key).await;
    }

    pub fn invalidate_all(&self) {
        self.entries.invalidate_all();
    }
}

/// The three independent cache domains.
pub struct CacheDomains {
    /// Full program scan, keyed by program id
    pub catalog: TtlCache<Pubkey, Catalog>,
    /// Off-chain JSON metadata, keyed by URI
    pub metadata: TtlCache<String, serde_json::Value>,
    /// Items of one collection, keyed by collection address
    pub collection_items: TtlCache<Pubkey, Vec<ItemTypeRecord>>,
    /// Collections administered by one wallet
    pub wallet_collections: TtlCache<Pubkey, Vec<CollectionRecord>>,
}

impl CacheDomains {
    pub fn new(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        let view_ttl = Duration::from_secs(config.view_ttl_seconds);
        Self {
            catalog: TtlCache::new("catalog", Duration::from_secs(config.catalog_ttl_seconds), clock.clone()),
            metadata: TtlCache::new("metadata", Duration::from_secs(config.metadata_ttl_seconds), clock.clone()),
            collection_items: TtlCache::new("collection_items", view_ttl, clock.clone()),
            wallet_collections: TtlCache::new("wallet_collections", view_ttl, clock),
        }
    }
}
