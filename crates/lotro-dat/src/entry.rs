//! Entry records and extracted payloads

use serde::Serialize;
use std::fmt;

use crate::bytes::ByteReader;
use crate::error::Result;

/// Size of one on-disk entry record
pub const ENTRY_RECORD_LEN: usize = 32;

/// One addressable blob inside an archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct EntryRecord {
    /// Opaque 32-bit identifier
    pub id: u32,
    /// Absolute offset of the payload in the archive
    pub offset: u32,
    /// Logical payload size
    pub size: u32,
    /// Opaque timestamp
    pub timestamp: u32,
    /// Per-entry iteration counter
    pub version: u32,
    /// On-disk size when compressed, 0 when stored plain
    pub compressed_size: u32,
}

impl EntryRecord {
    /// Decode the record starting at `offset` in `reader`
    pub fn parse(reader: &ByteReader<'_>, offset: usize) -> Result<Self> {
        let record = reader.sub(offset, ENTRY_RECORD_LEN)?;
        // Bytes 0..4 and 28..32 are reserved.
        Ok(Self {
            id: record.u32_at(4)?,
            offset: record.u32_at(8)?,
            size: record.u32_at(12)?,
            timestamp: record.u32_at(16)?,
            version: record.u32_at(20)?,
            compressed_size: record.u32_at(24)?,
        })
    }

    /// Whether the payload is stored compressed
    pub const fn is_compressed(&self) -> bool {
        self.compressed_size != 0
    }

    /// Number of bytes the payload occupies on disk
    pub const fn stored_size(&self) -> u32 {
        if self.compressed_size != 0 {
            self.compressed_size
        } else {
            self.size
        }
    }
}

impl fmt::Display for EntryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08X} @0x{:08X} size={} version={}",
            self.id, self.offset, self.size, self.version
        )?;
        if self.is_compressed() {
            write!(f, " compressed={}", self.compressed_size)?;
        }
        Ok(())
    }
}

/// Raw bytes read for an entry.
///
/// No decompression is attempted: when `compressed` is set, `data` holds the
/// on-disk bytes and `logical_size` is what they would expand to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPayload {
    /// Bytes as stored in the archive
    pub data: Vec<u8>,
    /// The bytes are in the archive's (undocumented) compressed form
    pub compressed: bool,
    /// Logical size recorded in the entry
    pub logical_size: u32,
}

impl EntryPayload {
    /// Consume the payload, returning its bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}
