//! ledger-settlement - marketplace account decoding and transaction settlement
//!
//! This crate decodes the marketplace program's raw accounts into typed
//! records behind TTL caches, tracks submitted transactions until they are
//! confirmed or failed, and evaluates the task conditions that depend on them.

pub mod types;
pub mod clock;
pub mod config;
pub mod decoder;
pub mod ledger;
pub mod catalog;
pub mod settlement;
pub mod conditions;
pub mod worker;

// Re-export main types for convenience
pub use types::{LedgerTxDetail, Pubkey, RawAccount, TokenBalance};
pub use config::{ServiceConfig, ServiceConfigBuilder};
