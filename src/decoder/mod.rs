//! Raw account decoding for the marketplace program.
//!
//! `cursor` reads primitives with bounds checks, `records` defines the typed
//! output, and `account` turns a whole buffer into at most one record.

pub mod cursor;
pub mod records;
pub mod account;

pub use cursor::{ByteCursor, CursorError};
pub use records::{
    CollectionRecord, Discriminators, ItemTypeRecord, MarketplaceRecord,
    MAX_NAME_LEN, MAX_SYMBOL_LEN, MAX_URI_LEN,
};
pub use account::{AccountDecoder, DecodedAccount, DecoderConfig};
