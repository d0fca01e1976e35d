//! Core types shared by the decoder, the catalog and the settlement tracker.
//!
//! These are the shapes the ledger collaborator hands back. They are plain data
//! so the subsystems never depend on the RPC client types directly.

use serde::{Deserialize, Serialize};

pub use solana_sdk::pubkey::Pubkey;

/// One account as returned by a ledger read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAccount {
    /// Address of the account itself
    pub address: Pubkey,
    /// Program that owns the account
    pub owner: Pubkey,
    /// Lamport balance
    pub lamports: u64,
    /// Opaque account payload
    pub data: Vec<u8>,
}

impl RawAccount {
    pub fn new(address: Pubkey, owner: Pubkey, lamports: u64, data: Vec<u8>) -> Self {
        Self { address, owner, lamports, data }
    }
}

/// Token balance entry attached to a confirmed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBalance {
    /// Index into the transaction's account key list
    pub account_index: u8,
    pub mint: String,
    pub owner: Option<String>,
    /// Raw amount in the token's smallest unit
    pub amount: u128,
    pub decimals: u8,
}

/// Transaction detail as reported by the ledger once the signature is indexed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerTxDetail {
    pub slot: u64,
    pub block_time: Option<i64>,
    pub fee: u64,
    /// Execution error, serialized as the ledger reported it
    pub err: Option<serde_json::Value>,
    /// Account keys in message order (static keys followed by loaded addresses)
    pub account_keys: Vec<String>,
    pub pre_balances: Vec<u64>,
    pub post_balances: Vec<u64>,
    pub pre_token_balances: Vec<TokenBalance>,
    pub post_token_balances: Vec<TokenBalance>,
}
