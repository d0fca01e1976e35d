//! Service configuration.
//!
//! Every section has defaults, so a JSON file only needs the fields it changes.

use crate::decoder::DecoderConfig;
use crate::types::Pubkey;
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

pub const DEFAULT_PROGRAM_ID: &str = "64QtrxckGCrYgX9AcLdAizSne1iKrXwQfwPJMBmBmsqp";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// RPC endpoints, tried round-robin
    pub endpoints: Vec<String>,
    pub timeout_seconds: u64,
    pub retry_attempts: usize,
    pub requests_per_second: u32,
    /// `processed`, `confirmed` or `finalized`
    pub commitment: String,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoints: vec!["https://api.devnet.solana.com".to_string()],
            timeout_seconds: 30,
            retry_attempts: 3,
            requests_per_second: 20,
            commitment: "confirmed".to_string(),
        }
    }
}

/// TTLs for the three independent cache domains.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Full program scan
    pub catalog_ttl_seconds: u64,
    /// Off-chain JSON metadata, per URI
    pub metadata_ttl_seconds: u64,
    /// Per-wallet and per-collection derived views
    pub view_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            catalog_ttl_seconds: 300,
            metadata_ttl_seconds: 1800,
            view_ttl_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub chunk_size: usize,
    pub chunk_delay_ms: u64,
    pub request_timeout_seconds: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            chunk_size: 10,
            chunk_delay_ms: 1000,
            request_timeout_seconds: 10,
        }
    }
}

impl BatchConfig {
    pub fn chunk_delay(&self) -> Duration {
        Duration::from_millis(self.chunk_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub default_required_confirmations: u64,
    pub sweep_interval_seconds: u64,
    pub catalog_refresh_interval_seconds: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            default_required_confirmations: 1,
            sweep_interval_seconds: 30,
            catalog_refresh_interval_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub rpc: RpcConfig,
    /// Marketplace program whose accounts are scanned
    pub program_id: String,
    pub database_url: String,
    pub log_level: String,
    pub decoder: DecoderConfig,
    pub cache: CacheConfig,
    pub batch: BatchConfig,
    pub tracker: TrackerConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            rpc: RpcConfig::default(),
            program_id: DEFAULT_PROGRAM_ID.to_string(),
            database_url: "sqlite:./settlement.db?mode=rwc".to_string(),
            log_level: "info".to_string(),
            decoder: DecoderConfig::default(),
            cache: CacheConfig::default(),
            batch: BatchConfig::default(),
            tracker: TrackerConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Loads and validates a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn program_id(&self) -> Result<Pubkey> {
        Pubkey::from_str(&self.program_id)
            .map_err(|e| anyhow!("Invalid program id '{}': {}", self.program_id, e))
    }

    pub fn tracing_level(&self) -> Result<Level> {
        Level::from_str(&self.log_level).map_err(|_| anyhow!("Invalid log level '{}'", self.log_level))
    }

    pub fn validate(&self) -> Result<()> {
        if self.rpc.endpoints.is_empty() {
            bail!("At least one RPC endpoint is required");
        }
        self.program_id()?;
        self.tracing_level()?;
        if self.batch.chunk_size == 0 {
            bail!("batch.chunk_size must be greater than zero");
        }
        let cache = &self.cache;
        if cache.catalog_ttl_seconds == 0 || cache.metadata_ttl_seconds == 0 || cache.view_ttl_seconds == 0 {
            bail!("cache TTLs must be greater than zero");
        }
        if self.tracker.default_required_confirmations == 0 {
            bail!("tracker.default_required_confirmations must be at least 1");
        }
        if self.tracker.sweep_interval_seconds == 0 {
            bail!("tracker.sweep_interval_seconds must be greater than zero");
        }
        if self.tracker.catalog_refresh_interval_seconds == 0 {
            bail!("tracker.catalog_refresh_interval_seconds must be greater than zero");
        }
        Ok(())
    }
}

/// Fluent construction with defaults for everything not set.
#[derive(Debug, Clone, Default)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rpc_endpoints(mut self, endpoints: Vec<String>) -> Self {
        self.config.rpc.endpoints = endpoints;
        self
    }

    pub fn with_program_id(mut self, program_id: impl Into<String>) -> Self {
        self.config.program_id = program_id.into();
        self
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.config.database_url = url.into();
        self
    }

    pub fn with_strict_discriminators(mut self, strict: bool) -> Self {
        self.config.decoder.strict_discriminators = strict;
        self
    }

    pub fn with_cache_ttls(mut self, catalog_seconds: u64, metadata_seconds: u64, view_seconds: u64) -> Self {
        self.config.cache = CacheConfig {
            catalog_ttl_seconds: catalog_seconds,
            metadata_ttl_seconds: metadata_seconds,
            view_ttl_seconds: view_seconds,
        };
        self
    }

    pub fn with_batch(mut self, chunk_size: usize, chunk_delay_ms: u64) -> Self {
        self.config.batch.chunk_size = chunk_size;
        self.config.batch.chunk_delay_ms = chunk_delay_ms;
        self
    }

    pub fn with_required_confirmations(mut self, confirmations: u64) -> Self {
        self.config.tracker.default_required_confirmations = confirmations;
        self
    }

    pub fn with_sweep_interval(mut self, seconds: u64) -> Self {
        self.config.tracker.sweep_interval_seconds = seconds;
        self
    }

    pub fn build(self) -> Result<ServiceConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
