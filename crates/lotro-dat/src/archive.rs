//! Read-only access to a single `.dat` archive

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::directory::read_tree;
use crate::entry::{EntryPayload, EntryRecord};
use crate::error::Result;
use crate::source::{BlockSource, FileSource};
use crate::superblock::{SUPERBLOCK_READ_LEN, Superblock};

/// An opened archive with its directory fully indexed.
///
/// Opening reads the superblock and walks the whole directory tree up front;
/// afterwards lookups are in-memory and only [`DatArchive::extract`] touches
/// the underlying storage again.
#[derive(Debug)]
pub struct DatArchive<S = FileSource> {
    source: S,
    path: Option<PathBuf>,
    superblock: Superblock,
    entries: Vec<EntryRecord>,
    index: HashMap<u32, usize>,
}

impl DatArchive<FileSource> {
    /// Open the archive at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = FileSource::open(path)?;
        let mut archive = Self::from_source(source)?;
        archive.path = Some(path.to_path_buf());

        info!(
            "opened {} (iteration {}, {} entries)",
            path.display(),
            archive.iteration_version(),
            archive.file_count()
        );
        Ok(archive)
    }
}

impl<S: BlockSource> DatArchive<S> {
    /// Decode an archive from any [`BlockSource`]
    pub fn from_source(source: S) -> Result<Self> {
        let header = source.read_up_to(0, SUPERBLOCK_READ_LEN)?;
        let superblock = Superblock::parse(&header, source.len())?;

        let tree = read_tree(&source, u64::from(superblock.directory_offset))?;
        debug!(
            "directory walk: {} nodes, {} entries, {} children skipped",
            tree.nodes_visited,
            tree.entries.len(),
            tree.children_skipped
        );

        let mut index = HashMap::with_capacity(tree.entries.len());
        for (position, entry) in tree.entries.iter().enumerate() {
            if let Some(previous) = index.insert(entry.id, position) {
                debug!(
                    "duplicate entry id {:08X} (positions {} and {}), keeping the later one",
                    entry.id, previous, position
                );
            }
        }

        Ok(Self {
            source,
            path: None,
            superblock,
            entries: tree.entries,
            index,
        })
    }

    /// Path the archive was opened from, if it came from a file
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Decoded superblock
    pub const fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    /// Iteration version recorded in the superblock
    pub const fn iteration_version(&self) -> u32 {
        self.superblock.version
    }

    /// All non-empty entries in directory order
    pub fn entries(&self) -> &[EntryRecord] {
        &self.entries
    }

    /// Number of non-empty entries
    pub fn file_count(&self) -> usize {
        self.entries.len()
    }

    /// Look up an entry by identifier
    pub fn find(&self, id: u32) -> Option<&EntryRecord> {
        self.index.get(&id).map(|&position| &self.entries[position])
    }

    /// Highest per-entry version, 0 for an empty archive
    pub fn max_entry_version(&self) -> u32 {
        self.entries.iter().map(|e| e.version).max().unwrap_or(0)
    }

    /// Read the stored bytes of `entry`.
    ///
    /// Compressed entries come back as their raw on-disk bytes with
    /// [`EntryPayload::compressed`] set.
    pub fn extract(&self, entry: &EntryRecord) -> Result<EntryPayload> {
        let len = entry.stored_size() as usize;
        let data = self.source.read_at(u64::from(entry.offset), len)?;
        Ok(EntryPayload {
            data,
            compressed: entry.is_compressed(),
            logical_size: entry.size,
        })
    }

    /// Look up `id` and extract it
    pub fn extract_by_id(&self, id: u32) -> Result<Option<EntryPayload>> {
        self.find(id).map(|entry| self.extract(entry)).transpose()
    }

    /// Give back the underlying source
    pub fn into_source(self) -> S {
        self.source
    }
}

impl DatArchive<Vec<u8>> {
    /// Decode an archive held entirely in memory
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::from_source(data)
    }
}
