//! Account decoder: one raw buffer in, at most one typed record out.
//!
//! The decoder is total. Truncated, oversized or foreign buffers yield `None`
//! and are logged at debug level; nothing is ever partially emitted.

use crate::decoder::cursor::{ByteCursor, CursorError};
use crate::decoder::records::{
    is_printable_ascii, CollectionRecord, Discriminators, ItemTypeRecord, MarketplaceRecord,
    DISCRIMINATOR_LEN, MAX_NAME_LEN, MAX_SYMBOL_LEN, MAX_URI_LEN,
};
use crate::types::{Pubkey, RawAccount};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Require a verified discriminator for every record kind.
    ///
    /// When `false`, an account that is neither a Collection nor a Marketplace
    /// is read as an ItemType at offset 8 without checking its tag.
    pub strict_discriminators: bool,
    pub discriminators: Discriminators,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            strict_discriminators: true,
            discriminators: Discriminators::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecodedAccount {
    Collection(CollectionRecord),
    ItemType(ItemTypeRecord),
    Marketplace(MarketplaceRecord),
    /// Well-formed header, but the tag matches no known kind
    Unknown { address: Pubkey, discriminator: [u8; DISCRIMINATOR_LEN] },
}

#[derive(Debug, Clone, Default)]
pub struct AccountDecoder {
    config: DecoderConfig,
}

impl AccountDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Decodes one account. `None` means the buffer was rejected.
    pub fn decode(&self, account: &RawAccount) -> Option<DecodedAccount> {
        self.decode_bytes(&account.address, &account.data)
    }

    pub fn decode_bytes(&self, address: &Pubkey, data: &[u8]) -> Option<DecodedAccount> {
        if data.len() < DISCRIMINATOR_LEN {
            debug!(%address, len = data.len(), "account shorter than discriminator, skipping");
            return None;
        }

        let mut cursor = ByteCursor::new(data);
        let tag = cursor.read_discriminator().ok()?;
        let tags = &self.config.discriminators;

        let decoded = if tag == tags.collection {
            decode_collection(&mut cursor, address).map(DecodedAccount::Collection)
        } else if tag == tags.marketplace {
            decode_marketplace(&mut cursor, address).map(DecodedAccount::Marketplace)
        } else if tag == tags.item_type || !self.config.strict_discriminators {
            decode_item_type(&mut cursor, address).map(DecodedAccount::ItemType)
        } else {
            return Some(DecodedAccount::Unknown { address: *address, discriminator: tag });
        };

        match decoded {
            Ok(record) => Some(record),
            Err(reason) => {
                debug!(%address, %reason, "rejected account");
                None
            }
        }
    }

    /// Decodes a batch, dropping rejected buffers.
    pub fn decode_all(&self, accounts: &[RawAccount]) -> Vec<DecodedAccount> {
        accounts.iter().filter_map(|account| self.decode(account)).collect()
    }
}

#[derive(Debug, thiserror::Error)]
enum Rejection {
    #[error(transparent)]
    Cursor(#[from] CursorError),
    #[error("{0}")]
    Invalid(&'static str),
}

fn decode_collection(cursor: &mut ByteCursor<'_>, address: &Pubkey) -> Result<CollectionRecord, Rejection> {
    let admin = cursor.read_pubkey()?;
    let name = cursor.read_string(MAX_NAME_LEN)?;
    let symbol = cursor.read_string(MAX_SYMBOL_LEN)?;
    let uri = cursor.read_string(MAX_URI_LEN)?;
    let royalty_bps = cursor.read_u16()?;
    let mint = cursor.read_pubkey()?;
    let is_active = cursor.read_bool()?;
    let bump = cursor.read_u8()?;

    if name.is_empty() || !is_printable_ascii(&name) {
        return Err(Rejection::Invalid("collection name empty or not printable ASCII"));
    }
    if symbol.is_empty() || !is_printable_ascii(&symbol) {
        return Err(Rejection::Invalid("collection symbol empty or not printable ASCII"));
    }

    Ok(CollectionRecord {
        admin,
        name,
        symbol,
        uri,
        royalty_bps,
        mint,
        is_active,
        bump,
        address: *address,
    })
}

fn decode_item_type(cursor: &mut ByteCursor<'_>, address: &Pubkey) -> Result<ItemTypeRecord, Rejection> {
    let collection_address = cursor.read_pubkey()?;
    let name = cursor.read_string(MAX_NAME_LEN)?;
    let uri = cursor.read_string(MAX_URI_LEN)?;
    let price = cursor.read_u64()?;
    let max_supply = cursor.read_u64()?;
    let current_supply = cursor.read_u64()?;
    let staking_amount = cursor.read_option(|c| c.read_u64())?;
    let bump = cursor.read_u8()?;

    Ok(ItemTypeRecord {
        collection_address,
        name,
        uri,
        price,
        max_supply,
        current_supply,
        staking_amount,
        bump,
        address: *address,
    })
}

fn decode_marketplace(cursor: &mut ByteCursor<'_>, address: &Pubkey) -> Result<MarketplaceRecord, Rejection> {
    Ok(MarketplaceRecord {
        admin: cursor.read_pubkey()?,
        fee_bps: cursor.read_u16()?,
        total_collections: cursor.read_u64()?,
        bump: cursor.read_u8()?,
        address: *address,
    })
}
