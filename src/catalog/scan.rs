//! Full program scan: enumerate every account the program owns and decode it.

use crate::decoder::{AccountDecoder, CollectionRecord, DecodedAccount, ItemTypeRecord, MarketplaceRecord};
use crate::ledger::Ledger;
use crate::types::Pubkey;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

/// Everything the decoder recognised in one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub marketplaces: Vec<MarketplaceRecord>,
    pub collections: Vec<CollectionRecord>,
    pub item_types: Vec<ItemTypeRecord>,
    /// Accounts with a tag that matches no known kind
    pub unknown: usize,
    /// Accounts the decoder rejected
    pub rejected: usize,
}

impl Catalog {
    pub fn items_of(&self, collection: &Pubkey) -> Vec<ItemTypeRecord> {
        self.item_types
            .iter()
            .filter(|item| &item.collection_address == collection)
            .cloned()
            .collect()
    }

    pub fn collections_of(&self, admin: &Pubkey) -> Vec<CollectionRecord> {
        self.collections
            .iter()
            .filter(|collection| &collection.admin == admin)
            .cloned()
            .collect()
    }

    pub fn collection(&self, address: &Pubkey) -> Option<&CollectionRecord> {
        self.collections.iter().find(|collection| &collection.address == address)
    }
}

pub struct AccountScanner {
    ledger: Arc<dyn Ledger>,
    decoder: AccountDecoder,
}

impl AccountScanner {
    pub fn new(ledger: Arc<dyn Ledger>, decoder: AccountDecoder) -> Self {
        Self { ledger, decoder }
    }

    /// Fetches and decodes all accounts of `program_id`.
    ///
    /// Ledger failures propagate. Malformed accounts are counted and skipped.
    #[instrument(skip(self), fields(program_id = %program_id))]
    pub async fn scan(&self, program_id: &Pubkey) -> Result<Catalog> {
        let accounts = self
            .ledger
            .get_program_accounts(program_id)
            .await
            .context("Program account scan failed")?;

        let mut catalog = Catalog::default();
        for account in &accounts {
            match self.decoder.decode(account) {
                Some(DecodedAccount::Collection(record)) => catalog.collections.push(record),
                Some(DecodedAccount::ItemType(record)) => catalog.item_types.push(record),
                Some(DecodedAccount::Marketplace(record)) => catalog.marketplaces.push(record),
                Some(DecodedAccount::Unknown { .. }) => catalog.unknown += 1,
                None => catalog.rejected += 1,
            }
        }

        info!(
            accounts = accounts.len(),
            collections = catalog.collections.len(),
            item_types = catalog.item_types.len(),
            unknown = catalog.unknown,
            rejected = catalog.rejected,
            "Program scan complete"
        );
        Ok(catalog)
    }
}
