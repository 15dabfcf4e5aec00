//! Positioned reads over archive storage

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::{DatError, Result};

/// Random-access byte storage an archive can be read from.
///
/// Every read is range-checked against [`BlockSource::len`] before any I/O
/// happens, so callers get [`DatError::TruncatedInput`] rather than a short
/// read.
pub trait BlockSource {
    /// Total number of bytes available
    fn len(&self) -> u64;

    /// Whether the source holds no bytes
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read exactly `len` bytes starting at `offset`
    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>>;

    /// Read up to `len` bytes starting at `offset`, stopping at the end
    fn read_up_to(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let available = self.len().saturating_sub(offset);
        let len = usize::try_from(available).map_or(len, |available| len.min(available));
        self.read_at(offset, len)
    }
}

fn check_range(source_len: u64, offset: u64, len: usize) -> Result<()> {
    let fits = offset
        .checked_add(len as u64)
        .is_some_and(|end| end <= source_len);
    if fits {
        Ok(())
    } else {
        Err(DatError::TruncatedInput {
            offset,
            needed: len as u64,
            available: source_len.saturating_sub(offset),
        })
    }
}

/// A `.dat` file opened for reading
#[derive(Debug)]
pub struct FileSource {
    file: File,
    len: u64,
}

impl FileSource {
    /// Open `path` read-only and record its length
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self { file, len })
    }
}

impl BlockSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        check_range(self.len, offset, len)?;

        // `Read`/`Seek` are implemented for `&File`, so no `&mut self` is needed.
        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                // File shrank underneath us.
                DatError::TruncatedInput {
                    offset,
                    needed: len as u64,
                    available: 0,
                }
            } else {
                DatError::Io(e)
            }
        })?;
        Ok(buf)
    }
}

impl BlockSource for [u8] {
    fn len(&self) -> u64 {
        <[u8]>::len(self) as u64
    }

    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        check_range(BlockSource::len(self), offset, len)?;
        let start = offset as usize;
        Ok(self[start..start + len].to_vec())
    }
}

impl BlockSource for Vec<u8> {
    fn len(&self) -> u64 {
        self.as_slice().len() as u64
    }

    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        self.as_slice().read_at(offset, len)
    }
}
