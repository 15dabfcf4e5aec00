//! Synthetic archive builder for tests
//!
//! Produces byte-exact `.dat` images with a valid superblock and any number
//! of directory nodes and payloads at caller-chosen offsets.

use std::path::Path;

use crate::directory::{CHILD_SLOT_LEN, CHILD_SLOTS_OFFSET, ENTRIES_OFFSET, ENTRY_COUNT_OFFSET};
use crate::entry::ENTRY_RECORD_LEN;
use crate::superblock::{MAGIC_LP, MAGIC_LP_OFFSET, MAGIC_TB, MAGIC_TB_OFFSET};

/// Default image length (4 KiB)
pub const DEFAULT_LEN: usize = 0x1000;
/// Default root directory offset
pub const DEFAULT_DIRECTORY_OFFSET: u32 = 0x200;
/// Default block size
pub const DEFAULT_BLOCK_SIZE: u32 = 0x800;

/// Entry description for [`ArchiveBuilder::node`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixtureEntry {
    /// Entry identifier
    pub id: u32,
    /// Payload offset
    pub offset: u32,
    /// Logical size
    pub size: u32,
    /// Per-entry version
    pub version: u32,
    /// On-disk size, 0 for plain entries
    pub compressed_size: u32,
}

impl FixtureEntry {
    /// An uncompressed entry
    pub const fn plain(id: u32, offset: u32, size: u32, version: u32) -> Self {
        Self {
            id,
            offset,
            size,
            version,
            compressed_size: 0,
        }
    }

    /// An entry stored in compressed form
    pub const fn compressed(
        id: u32,
        offset: u32,
        size: u32,
        version: u32,
        compressed_size: u32,
    ) -> Self {
        Self {
            id,
            offset,
            size,
            version,
            compressed_size,
        }
    }
}

/// Builds an archive image in memory
#[derive(Debug, Clone)]
pub struct ArchiveBuilder {
    data: Vec<u8>,
    block_size: u32,
    version: u32,
    directory_offset: u32,
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveBuilder {
    /// A 4 KiB image with the root directory at 0x200 and iteration version 1
    pub fn new() -> Self {
        Self::with_len(DEFAULT_LEN)
    }

    /// An image of `len` bytes
    pub fn with_len(len: usize) -> Self {
        Self {
            data: vec![0u8; len],
            block_size: DEFAULT_BLOCK_SIZE,
            version: 1,
            directory_offset: DEFAULT_DIRECTORY_OFFSET,
        }
    }

    /// Set the superblock iteration version
    #[must_use]
    pub const fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Set the superblock block size
    #[must_use]
    pub const fn block_size(mut self, block_size: u32) -> Self {
        self.block_size = block_size;
        self
    }

    /// Set the root directory offset
    #[must_use]
    pub const fn directory_offset(mut self, offset: u32) -> Self {
        self.directory_offset = offset;
        self
    }

    /// Write a directory node at `offset` with the given child node offsets
    /// and entries
    #[must_use]
    pub fn node(mut self, offset: u32, children: &[u32], entries: &[FixtureEntry]) -> Self {
        let base = offset as usize;
        for (slot, child) in children.iter().enumerate() {
            let at = base + CHILD_SLOTS_OFFSET + slot * CHILD_SLOT_LEN;
            self.put(at, self.block_size);
            self.put(at + 4, *child);
        }

        self.put(base + ENTRY_COUNT_OFFSET, entries.len() as u32);

        for (i, entry) in entries.iter().enumerate() {
            let at = base + ENTRIES_OFFSET + i * ENTRY_RECORD_LEN;
            self.put(at, 0);
            self.put(at + 4, entry.id);
            self.put(at + 8, entry.offset);
            self.put(at + 12, entry.size);
            self.put(at + 16, 0x5F00_0000 + i as u32);
            self.put(at + 20, entry.version);
            self.put(at + 24, entry.compressed_size);
            self.put(at + 28, 0);
        }
        self
    }

    /// Copy `bytes` into the image at `offset`
    #[must_use]
    pub fn payload(mut self, offset: u32, bytes: &[u8]) -> Self {
        let start = offset as usize;
        self.ensure_len(start + bytes.len());
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
        self
    }

    /// Finish the image, writing the superblock last
    pub fn build(mut self) -> Vec<u8> {
        let file_size = self.data.len() as u32;
        self.put(MAGIC_LP_OFFSET, MAGIC_LP);
        self.put(MAGIC_TB_OFFSET, MAGIC_TB);
        self.put(0x144, self.block_size);
        self.put(0x148, file_size);
        self.put(0x14C, self.version);
        self.put(0x150, self.version);
        self.put(0x154, 0);
        self.put(0x158, 0);
        self.put(0x15C, 0);
        self.put(0x160, self.directory_offset);
        self.data
    }

    /// Build the image and write it to `path`
    pub fn write_to(self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.build())
    }

    fn put(&mut self, at: usize, value: u32) {
        self.ensure_len(at + 4);
        self.data[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn ensure_len(&mut self, len: usize) {
        if self.data.len() < len {
            self.data.resize(len, 0);
        }
    }
}

/// The 4 KiB single-entry archive used throughout the test suites: entry
/// `0xCAFEBABE` at 0x800, 16 bytes `0x00..0x0F`, entry version 7.
pub fn tiny_archive() -> Vec<u8> {
    let payload: Vec<u8> = (0u8..16).collect();
    ArchiveBuilder::new()
        .node(
            DEFAULT_DIRECTORY_OFFSET,
            &[],
            &[FixtureEntry::plain(0xCAFE_BABE, 0x800, 16, 7)],
        )
        .payload(0x800, &payload)
        .build()
}
