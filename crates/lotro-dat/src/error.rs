//! Error types for archive operations

use thiserror::Error;

/// Errors raised while opening, traversing or reading a `.dat` archive
#[derive(Debug, Error)]
pub enum DatError {
    /// Underlying file I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A read would run past the end of the available bytes
    #[error("truncated input: need {needed} bytes at offset 0x{offset:X}, only {available} available")]
    TruncatedInput {
        /// Absolute offset of the attempted read
        offset: u64,
        /// Number of bytes requested
        needed: u64,
        /// Number of bytes that were available from `offset`
        available: u64,
    },

    /// A superblock magic value did not match
    #[error("bad magic at 0x{offset:X}: expected 0x{expected:04X}, got 0x{actual:04X}")]
    BadMagic {
        /// Absolute offset of the magic field
        offset: u64,
        /// Required value
        expected: u32,
        /// Value found in the file
        actual: u32,
    },

    /// Superblock fields are inconsistent with the file
    #[error("invalid superblock: {0}")]
    InvalidSuperblock(String),

    /// A directory node could not be decoded
    #[error("corrupt directory node at 0x{offset:X}: {reason}")]
    CorruptDirectory {
        /// Absolute offset of the node
        offset: u64,
        /// What was wrong with it
        reason: String,
    },
}

impl DatError {
    /// Whether this error means the file is not a `.dat` archive at all,
    /// as opposed to an archive that is damaged or unreadable.
    pub fn is_not_archive(&self) -> bool {
        matches!(self, Self::BadMagic { .. })
    }
}

/// Result type for archive operations
pub type Result<T> = std::result::Result<T, DatError>;
