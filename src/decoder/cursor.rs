//! Bounds-checked little-endian reader over an account payload.

use crate::types::Pubkey;
use thiserror::Error;

pub const PUBKEY_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CursorError {
    #[error("read of {needed} bytes at offset {offset} exceeds buffer of {len} bytes")]
    OutOfBounds { offset: usize, needed: usize, len: usize },
    #[error("string length {len} exceeds field maximum {max}")]
    StringTooLong { len: usize, max: usize },
    #[error("string at offset {offset} is not valid UTF-8")]
    InvalidUtf8 { offset: usize },
    #[error("invalid option tag {tag} at offset {offset}")]
    InvalidOptionTag { tag: u8, offset: usize },
}

/// Reader that never reads past the end of its buffer.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// Cursor positioned at `offset`. Reads still fail if `offset` is past the end.
    pub fn at(data: &'a [u8], offset: usize) -> Self {
        Self { data, offset }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.offset)
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], CursorError> {
        let out_of_bounds = CursorError::OutOfBounds {
            offset: self.offset,
            needed,
            len: self.data.len(),
        };
        let end = self.offset.checked_add(needed).ok_or(out_of_bounds.clone())?;
        if end > self.data.len() {
            return Err(out_of_bounds);
        }
        let bytes = &self.data[self.offset..end];
        self.offset = end;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], CursorError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, CursorError> {
        Ok(self.take_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, CursorError> {
        Ok(u16::from_le_bytes(self.take_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, CursorError> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, CursorError> {
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64, CursorError> {
        Ok(i64::from_le_bytes(self.take_array()?))
    }

    /// Reads a fixed 8-byte schema tag.
    pub fn read_discriminator(&mut self) -> Result<[u8; 8], CursorError> {
        self.take_array()
    }

    pub fn read_pubkey(&mut self) -> Result<Pubkey, CursorError> {
        Ok(Pubkey::new_from_array(self.take_array::<PUBKEY_LEN>()?))
    }

    /// Reads a u32 length prefix followed by that many UTF-8 bytes.
    ///
    /// The declared length is checked against `max_len` before the buffer
    /// bound, so an oversized prefix is reported as such even on short buffers.
    pub fn read_string(&mut self, max_len: usize) -> Result<String, CursorError> {
        let len = self.read_u32()? as usize;
        if len > max_len {
            return Err(CursorError::StringTooLong { len, max: max_len });
        }
        let start = self.offset;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| CursorError::InvalidUtf8 { offset: start })
    }

    /// Reads a single-byte option tag: 0 is absent, 1 is present.
    pub fn read_option_tag(&mut self) -> Result<bool, CursorError> {
        let offset = self.offset;
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            tag => Err(CursorError::InvalidOptionTag { tag, offset }),
        }
    }

    pub fn read_option<T>(
        &mut self,
        read: impl FnOnce(&mut Self) -> Result<T, CursorError>,
    ) -> Result<Option<T>, CursorError> {
        if self.read_option_tag()? {
            read(self).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Reads a boolean stored as one byte. Any non-zero value is `true`.
    pub fn read_bool(&mut self) -> Result<bool, CursorError> {
        Ok(self.read_u8()? != 0)
    }
}
