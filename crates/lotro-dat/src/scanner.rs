//! Installation directory scanning

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::archive::DatArchive;

/// Archive file extension, compared case-insensitively
pub const DAT_EXTENSION: &str = "dat";

/// Options controlling which files [`scan_archives`] considers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOptions {
    /// Descend into subdirectories instead of scanning the top level only
    pub recursive: bool,
}

impl ScanOptions {
    /// Defaults overridden by `LOTRO_SCAN_RECURSIVE`
    pub fn from_env() -> Self {
        let recursive = std::env::var("LOTRO_SCAN_RECURSIVE")
            .ok()
            .and_then(|s| parse_flag(&s))
            .unwrap_or(false);
        Self { recursive }
    }

    /// Enable or disable recursion
    #[must_use]
    pub const fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// What a scan learned about one valid archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveSummary {
    /// Full path to the archive
    pub path: PathBuf,
    /// File name, used as the archive's key
    pub name: String,
    /// Superblock iteration version
    pub iteration_version: u32,
    /// Highest per-entry version
    pub max_entry_version: u32,
    /// Number of non-empty entries
    pub entry_count: usize,
}

impl<S: crate::source::BlockSource> From<(&Path, &DatArchive<S>)> for ArchiveSummary {
    fn from((path, archive): (&Path, &DatArchive<S>)) -> Self {
        Self {
            path: path.to_path_buf(),
            name: file_name(path),
            iteration_version: archive.iteration_version(),
            max_entry_version: archive.max_entry_version(),
            entry_count: archive.file_count(),
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn is_dat_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(DAT_EXTENSION))
}

/// Open every `.dat` file under `dir` and summarise the ones that validate.
///
/// Files that fail to open are logged and skipped; only an unreadable `dir`
/// itself yields an empty result with a warning. Results are sorted by file
/// name, and every archive handle is closed before this returns.
pub fn scan_archives(dir: &Path, options: &ScanOptions) -> Vec<ArchiveSummary> {
    let max_depth = if options.recursive { usize::MAX } else { 1 };
    let mut summaries = Vec::new();

    for item in WalkDir::new(dir).min_depth(1).max_depth(max_depth) {
        let item = match item {
            Ok(item) => item,
            Err(e) => {
                warn!("skipping unreadable path during scan of {}: {e}", dir.display());
                continue;
            }
        };

        if !item.file_type().is_file() || !is_dat_file(item.path()) {
            continue;
        }

        let path = item.path();
        match DatArchive::open(path) {
            Ok(archive) => summaries.push(ArchiveSummary::from((path, &archive))),
            Err(e) if e.is_not_archive() => {
                debug!("{} is not an archive: {e}", path.display());
            }
            Err(e) => {
                warn!("failed to open {}: {e}", path.display());
            }
        }
    }

    summaries.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.path.cmp(&b.path)));
    info!(
        "scanned {}: {} valid archives",
        dir.display(),
        summaries.len()
    );
    summaries
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::fixture::{ArchiveBuilder, FixtureEntry, tiny_archive};
    use pretty_assertions::assert_eq;

    fn archive(version: u32, entry_version: u32) -> Vec<u8> {
        ArchiveBuilder::new()
            .version(version)
            .node(0x200, &[], &[FixtureEntry::plain(1, 0x800, 8, entry_version)])
            .build()
    }

    #[test]
    fn summarises_valid_archives_sorted_by_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("client_surface.dat"), archive(30, 4)).unwrap();
        std::fs::write(dir.path().join("client_cell_1.dat"), archive(12, 9)).unwrap();
        std::fs::write(dir.path().join("client_gamelogic.DAT"), tiny_archive()).unwrap();

        let names: Vec<(String, u32, u32)> = scan_archives(dir.path(), &ScanOptions::default())
            .into_iter()
            .map(|s| (s.name, s.iteration_version, s.max_entry_version))
            .collect();

        assert_eq!(
            names,
            vec![
                ("client_cell_1.dat".to_string(), 12, 9),
                ("client_gamelogic.DAT".to_string(), 1, 7),
                ("client_surface.dat".to_string(), 30, 4),
            ]
        );
    }

    #[test]
    fn invalid_and_foreign_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("good.dat"), tiny_archive()).unwrap();
        std::fs::write(dir.path().join("junk.dat"), vec![0xAB; 2048]).unwrap();
        std::fs::write(dir.path().join("short.dat"), b"LP").unwrap();
        std::fs::write(dir.path().join("readme.txt"), tiny_archive()).unwrap();
        std::fs::create_dir(dir.path().join("folder.dat")).unwrap();

        let summaries = scan_archives(dir.path(), &ScanOptions::default());
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].name, "good.dat");
        assert_eq!(summaries[0].entry_count, 1);
    }

    #[test]
    fn recursion_is_opt_in() {
        let dir = tempfile::tempdir().unwrap();
        let locale = dir.path().join("en");
        std::fs::create_dir(&locale).unwrap();
        std::fs::write(dir.path().join("top.dat"), tiny_archive()).unwrap();
        std::fs::write(locale.join("client_local_English.dat"), tiny_archive()).unwrap();

        let top = scan_archives(dir.path(), &ScanOptions::default());
        assert_eq!(top.len(), 1);

        let all = scan_archives(dir.path(), &ScanOptions::default().recursive(true));
        let names: Vec<&str> = all.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["client_local_English.dat", "top.dat"]);
    }

    #[test]
    fn missing_directory_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan_archives(&dir.path().join("nope"), &ScanOptions::default()).is_empty());
    }

    #[test]
    fn summary_serializes_for_tooling() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.dat"), tiny_archive()).unwrap();
        let summaries = scan_archives(dir.path(), &ScanOptions::default());
        let json = serde_json::to_value(&summaries[0]).unwrap();
        assert_eq!(json["name"], "a.dat");
        assert_eq!(json["iteration_version"], 1);
        assert_eq!(json["entry_count"], 1);
    }

    #[test]
    fn flag_parsing() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" 0 "), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
