//! Typed records reconstructed from marketplace program accounts.

use crate::types::Pubkey;
use serde::{Deserialize, Serialize};

pub const DISCRIMINATOR_LEN: usize = 8;

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_SYMBOL_LEN: usize = 20;
pub const MAX_URI_LEN: usize = 500;

/// 8-byte schema tags, one per record kind.
///
/// Defaults are the Anchor account discriminators: the first eight bytes of
/// `sha256("account:<Name>")`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discriminators {
    pub collection: [u8; DISCRIMINATOR_LEN],
    pub item_type: [u8; DISCRIMINATOR_LEN],
    pub marketplace: [u8; DISCRIMINATOR_LEN],
}

impl Default for Discriminators {
    fn default() -> Self {
        Self {
            collection: [48, 160, 232, 205, 191, 207, 26, 141],
            item_type: [237, 251, 151, 69, 132, 117, 191, 44],
            marketplace: [70, 222, 41, 62, 78, 3, 32, 174],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionRecord {
    pub admin: Pubkey,
    pub name: String,
    pub symbol: String,
    pub uri: String,
    pub royalty_bps: u16,
    pub mint: Pubkey,
    pub is_active: bool,
    pub bump: u8,
    /// Account the record was read from
    pub address: Pubkey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemTypeRecord {
    pub collection_address: Pubkey,
    pub name: String,
    pub uri: String,
    /// Price in the smallest currency unit
    pub price: u64,
    pub max_supply: u64,
    pub current_supply: u64,
    pub staking_amount: Option<u64>,
    pub bump: u8,
    pub address: Pubkey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketplaceRecord {
    pub admin: Pubkey,
    pub fee_bps: u16,
    pub total_collections: u64,
    pub bump: u8,
    pub address: Pubkey,
}

/// Printable ASCII is 0x20..=0x7E.
pub fn is_printable_ascii(value: &str) -> bool {
    value.bytes().all(|b| (0x20..=0x7e).contains(&b))
}
