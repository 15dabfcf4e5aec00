//! Archive superblock
//!
//! The superblock lives in the first kilobyte of every `.dat` file. Two magic
//! values anchor it: `"LP"` (0x4C50) at 0x101 and `"TB"` (0x5442) at 0x140.
//! The remaining fields are consecutive little-endian `u32` values starting
//! right after the second magic.

use serde::Serialize;
use tracing::debug;

use crate::bytes::ByteReader;
use crate::error::{DatError, Result};

/// Number of leading bytes read to decode the superblock
pub const SUPERBLOCK_READ_LEN: usize = 1024;

/// First magic value ("LP")
pub const MAGIC_LP: u32 = 0x4C50;
/// Offset of the first magic value
pub const MAGIC_LP_OFFSET: usize = 0x101;
/// Second magic value ("TB")
pub const MAGIC_TB: u32 = 0x5442;
/// Offset of the second magic value
pub const MAGIC_TB_OFFSET: usize = 0x140;

const BLOCK_SIZE_OFFSET: usize = 0x144;
const FILE_SIZE_OFFSET: usize = 0x148;
const VERSION_OFFSET: usize = 0x14C;
const VERSION2_OFFSET: usize = 0x150;
const FREE_HEAD_OFFSET: usize = 0x154;
const FREE_TAIL_OFFSET: usize = 0x158;
const FREE_SIZE_OFFSET: usize = 0x15C;
const DIRECTORY_OFFSET_OFFSET: usize = 0x160;

/// Decoded superblock fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Superblock {
    /// Allocation block size
    pub block_size: u32,
    /// File size recorded by the writer
    pub file_size: u32,
    /// Iteration version of the archive
    pub version: u32,
    /// Secondary version counter
    pub version2: u32,
    /// Head of the free block list
    pub free_head: u32,
    /// Tail of the free block list
    pub free_tail: u32,
    /// Number of free blocks
    pub free_size: u32,
    /// Offset of the root directory node
    pub directory_offset: u32,
}

impl Superblock {
    /// Decode and validate the superblock from the leading bytes of a file.
    ///
    /// `file_len` is the real length of the file on disk, used to check that
    /// the directory offset points inside it.
    pub fn parse(header: &[u8], file_len: u64) -> Result<Self> {
        let reader = ByteReader::new(header);

        check_magic(&reader, MAGIC_LP_OFFSET, MAGIC_LP)?;
        check_magic(&reader, MAGIC_TB_OFFSET, MAGIC_TB)?;

        let superblock = Self {
            block_size: reader.u32_at(BLOCK_SIZE_OFFSET)?,
            file_size: reader.u32_at(FILE_SIZE_OFFSET)?,
            version: reader.u32_at(VERSION_OFFSET)?,
            version2: reader.u32_at(VERSION2_OFFSET)?,
            free_head: reader.u32_at(FREE_HEAD_OFFSET)?,
            free_tail: reader.u32_at(FREE_TAIL_OFFSET)?,
            free_size: reader.u32_at(FREE_SIZE_OFFSET)?,
            directory_offset: reader.u32_at(DIRECTORY_OFFSET_OFFSET)?,
        };

        superblock.validate(file_len)?;

        debug!(
            "superblock: block_size={}, version={}, directory_offset=0x{:x}",
            superblock.block_size, superblock.version, superblock.directory_offset
        );

        Ok(superblock)
    }

    /// Check the superblock against the physical file
    pub fn validate(&self, file_len: u64) -> Result<()> {
        if self.block_size == 0 {
            return Err(DatError::InvalidSuperblock(
                "block size is zero".to_string(),
            ));
        }

        if u64::from(self.directory_offset) >= file_len {
            return Err(DatError::InvalidSuperblock(format!(
                "directory offset 0x{:x} is outside the file ({} bytes)",
                self.directory_offset, file_len
            )));
        }

        Ok(())
    }
}

fn check_magic(reader: &ByteReader<'_>, offset: usize, expected: u32) -> Result<()> {
    let actual = reader.u32_at(offset)?;
    if actual == expected {
        Ok(())
    } else {
        Err(DatError::BadMagic {
            offset: offset as u64,
            expected,
            actual,
        })
    }
}
