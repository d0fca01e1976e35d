//! Shared fakes and account builders for integration tests.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ledger_settlement::catalog::MetadataSource;
use ledger_settlement::conditions::PointsSource;
use ledger_settlement::decoder::Discriminators;
use ledger_settlement::ledger::Ledger;
use ledger_settlement::types::{LedgerTxDetail, Pubkey, RawAccount, TokenBalance};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Default)]
struct LedgerState {
    accounts: HashMap<Pubkey, RawAccount>,
    program_accounts: Vec<RawAccount>,
    transactions: HashMap<String, LedgerTxDetail>,
    broken_signatures: HashSet<String>,
    current_slot: u64,
    scan_fails: bool,
}

/// In-memory ledger whose contents tests set directly.
#[derive(Default)]
pub struct MockLedger {
    state: Mutex<LedgerState>,
    pub scan_calls: AtomicUsize,
    pub transaction_calls: AtomicUsize,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_current_slot(&self, slot: u64) {
        self.state.lock().unwrap().current_slot = slot;
    }

    pub fn add_account(&self, account: RawAccount) {
        self.state.lock().unwrap().accounts.insert(account.address, account);
    }

    pub fn add_program_account(&self, account: RawAccount) {
        self.state.lock().unwrap().program_accounts.push(account);
    }

    pub fn set_transaction(&self, signature: &str, detail: LedgerTxDetail) {
        self.state
            .lock()
            .unwrap()
            .transactions
            .insert(signature.to_string(), detail);
    }

    /// Lookups for `signature` return a transport error.
    pub fn break_signature(&self, signature: &str) {
        self.state
            .lock()
            .unwrap()
            .broken_signatures
            .insert(signature.to_string());
    }

    pub fn set_scan_fails(&self, fails: bool) {
        self.state.lock().unwrap().scan_fails = fails;
    }

    pub fn scans(&self) -> usize {
        self.scan_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Ledger for MockLedger {
    async fn get_account(&self, address: &Pubkey) -> Result<Option<RawAccount>> {
        Ok(self.state.lock().unwrap().accounts.get(address).cloned())
    }

    async fn get_program_accounts(&self, _program_id: &Pubkey) -> Result<Vec<RawAccount>> {
        self.scan_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        if state.scan_fails {
            return Err(anyhow!("connection refused"));
        }
        Ok(state.program_accounts.clone())
    }

    async fn get_transaction(&self, signature: &str) -> Result<Option<LedgerTxDetail>> {
        self.transaction_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        if state.broken_signatures.contains(signature) {
            return Err(anyhow!("rpc timeout"));
        }
        Ok(state.transactions.get(signature).cloned())
    }

    async fn get_current_slot(&self) -> Result<u64> {
        Ok(self.state.lock().unwrap().current_slot)
    }
}

/// Metadata documents served from a map, with a call counter.
#[derive(Default)]
pub struct FakeMetadataSource {
    documents: Mutex<HashMap<String, serde_json::Value>>,
    pub calls: AtomicUsize,
}

impl FakeMetadataSource {
    pub fn with_documents(documents: Vec<(&str, serde_json::Value)>) -> Self {
        Self {
            documents: Mutex::new(documents.into_iter().map(|(k, v)| (k.to_string(), v)).collect()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataSource for FakeMetadataSource {
    async fn fetch(&self, uri: &str) -> Result<serde_json::Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.documents
            .lock()
            .unwrap()
            .get(uri)
            .cloned()
            .ok_or_else(|| anyhow!("404 for {}", uri))
    }
}

pub struct FixedPoints(pub HashMap<String, u64>);

#[async_trait]
impl PointsSource for FixedPoints {
    async fn points(&self, user_id: &str) -> Result<u64> {
        Ok(self.0.get(user_id).copied().unwrap_or(0))
    }
}

pub fn push_str(buf: &mut Vec<u8>, value: &str) {
    buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
    buf.extend_from_slice(value.as_bytes());
}

pub fn collection_bytes(admin: &Pubkey, mint: &Pubkey, name: &str, symbol: &str, uri: &str) -> Vec<u8> {
    let mut buf = Discriminators::default().collection.to_vec();
    buf.extend_from_slice(admin.as_ref());
    push_str(&mut buf, name);
    push_str(&mut buf, symbol);
    push_str(&mut buf, uri);
    buf.extend_from_slice(&250u16.to_le_bytes());
    buf.extend_from_slice(mint.as_ref());
    buf.push(1);
    buf.push(5);
    buf
}

pub fn item_type_bytes(collection: &Pubkey, name: &str, uri: &str, price: u64) -> Vec<u8> {
    let mut buf = Discriminators::default().item_type.to_vec();
    buf.extend_from_slice(collection.as_ref());
    push_str(&mut buf, name);
    push_str(&mut buf, uri);
    buf.extend_from_slice(&price.to_le_bytes());
    buf.extend_from_slice(&100u64.to_le_bytes());
    buf.extend_from_slice(&0u64.to_le_bytes());
    buf.push(0);
    buf.push(254);
    buf
}

pub fn marketplace_bytes(admin: &Pubkey, fee_bps: u16, total_collections: u64) -> Vec<u8> {
    let mut buf = Discriminators::default().marketplace.to_vec();
    buf.extend_from_slice(admin.as_ref());
    buf.extend_from_slice(&fee_bps.to_le_bytes());
    buf.extend_from_slice(&total_collections.to_le_bytes());
    buf.push(253);
    buf
}

pub fn program_account(program_id: &Pubkey, data: Vec<u8>) -> RawAccount {
    RawAccount::new(Pubkey::new_unique(), *program_id, 1_000_000, data)
}

/// A successful transfer of `lamports` from `payer` included at `slot`.
pub fn transfer_detail(slot: u64, payer: &str, lamports: u64) -> LedgerTxDetail {
    LedgerTxDetail {
        slot,
        block_time: Some(1_700_000_000),
        fee: 5000,
        err: None,
        account_keys: vec![payer.to_string(), "recipient".to_string()],
        pre_balances: vec![10_000_000_000, 0],
        post_balances: vec![10_000_000_000 - lamports - 5000, lamports],
        pre_token_balances: Vec::new(),
        post_token_balances: Vec::new(),
    }
}

/// A swap where `owner`'s token position grows by `amount`.
pub fn swap_detail(slot: u64, owner: &str, amount: u128) -> LedgerTxDetail {
    let balance = |value: u128| TokenBalance {
        account_index: 1,
        mint: "So11111111111111111111111111111111111111112".to_string(),
        owner: Some(owner.to_string()),
        amount: value,
        decimals: 9,
    };
    LedgerTxDetail {
        slot,
        block_time: Some(1_700_000_100),
        fee: 5000,
        err: None,
        account_keys: vec![owner.to_string(), "owner-ata".to_string()],
        pre_balances: vec![5_000_000, 2_039_280],
        post_balances: vec![4_995_000, 2_039_280],
        pre_token_balances: vec![balance(1_000)],
        post_token_balances: vec![balance(1_000 + amount)],
    }
}

pub fn failed_detail(slot: u64) -> LedgerTxDetail {
    LedgerTxDetail {
        slot,
        block_time: Some(1_700_000_200),
        fee: 5000,
        err: Some(serde_json::json!({ "InstructionError": [0, { "Custom": 6001 }] })),
        account_keys: vec!["payer".to_string()],
        pre_balances: vec![1_000_000],
        post_balances: vec![995_000],
        pre_token_balances: Vec::new(),
        post_token_balances: Vec::new(),
    }
}
