//! # lotro-dat
//!
//! Read-only access to the block-structured `.dat` archives that make up a
//! LOTRO game installation.
//!
//! An archive starts with a superblock in its first kilobyte, anchored by two
//! magic values, followed by a B-tree of directory nodes that index 32-bit
//! entry identifiers to payload blobs. This crate validates the superblock,
//! walks the directory iteratively (cycles and out-of-range children are
//! tolerated), indexes entries by id and returns raw payload bytes.
//! Decompression is not implemented: compressed entries come back as stored.
//!
//! All integer decoding goes through [`bytes::ByteReader`], which bounds-checks
//! every read, so a malformed archive produces a [`DatError`] rather than a
//! panic.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use lotro_dat::{DatArchive, ScanOptions, scan_archives};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), lotro_dat::DatError> {
//! let archive = DatArchive::open("client_general.dat")?;
//! println!("iteration {}", archive.iteration_version());
//! if let Some(entry) = archive.find(0x0100_0001) {
//!     let payload = archive.extract(entry)?;
//!     println!("{} bytes, compressed: {}", payload.data.len(), payload.compressed);
//! }
//!
//! for summary in scan_archives(Path::new("/games/lotro"), &ScanOptions::default()) {
//!     println!("{} -> {}", summary.name, summary.iteration_version);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod archive;
pub mod bytes;
pub mod directory;
pub mod entry;
pub mod error;
pub mod scanner;
pub mod source;
pub mod superblock;
pub mod versions;

#[cfg(any(test, feature = "test-utils"))]
pub mod fixture;

pub use archive::DatArchive;
pub use bytes::{ByteReader, read_u32_le};
pub use entry::{EntryPayload, EntryRecord};
pub use error::{DatError, Result};
pub use scanner::{ArchiveSummary, ScanOptions, scan_archives};
pub use source::{BlockSource, FileSource};
pub use superblock::Superblock;
pub use versions::iteration_versions;
