//! Bounded little-endian reads
//!
//! Every integer decoded from an archive goes through [`read_u32_le`] or a
//! [`ByteReader`]. Both check the requested range against the buffer before
//! touching it, so a malformed archive can only ever produce
//! [`DatError::TruncatedInput`], never an out-of-bounds access.

use crate::error::{DatError, Result};

/// Read a little-endian `u32` at `offset`.
///
/// Succeeds iff `offset + 4 <= buf.len()`.
pub fn read_u32_le(buf: &[u8], offset: usize) -> Result<u32> {
    ByteReader::new(buf).u32_at(offset)
}

/// Cursor-free view over a byte buffer that remembers where the buffer
/// started in the file, so errors report absolute offsets.
#[derive(Debug, Clone, Copy)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    base: u64,
}

impl<'a> ByteReader<'a> {
    /// Wrap a buffer that starts at file offset 0
    pub const fn new(buf: &'a [u8]) -> Self {
        Self { buf, base: 0 }
    }

    /// Wrap a buffer that was read from absolute offset `base`
    pub const fn at(buf: &'a [u8], base: u64) -> Self {
        Self { buf, base }
    }

    /// Number of bytes in the view
    pub const fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether the view is empty
    pub const fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Absolute offset of the first byte in the view
    pub const fn base(&self) -> u64 {
        self.base
    }

    /// Borrow `len` bytes starting at `offset`
    pub fn slice(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        let end = offset
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| self.truncated(offset, len))?;
        Ok(&self.buf[offset..end])
    }

    /// Little-endian `u32` at `offset`
    pub fn u32_at(&self, offset: usize) -> Result<u32> {
        let bytes = self.slice(offset, 4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Sub-view of `len` bytes starting at `offset`, keeping absolute offsets
    pub fn sub(&self, offset: usize, len: usize) -> Result<Self> {
        let buf = self.slice(offset, len)?;
        Ok(Self {
            buf,
            base: self.base + offset as u64,
        })
    }

    fn truncated(&self, offset: usize, needed: usize) -> DatError {
        DatError::TruncatedInput {
            offset: self.base.saturating_add(offset as u64),
            needed: needed as u64,
            available: self.buf.len().saturating_sub(offset) as u64,
        }
    }
}
