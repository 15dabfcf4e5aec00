//! Iteration versions of an installation's archives

use std::collections::BTreeMap;
use std::path::Path;

use crate::scanner::{ScanOptions, scan_archives};

/// Archive file name to superblock iteration version.
///
/// When a recursive scan finds the same file name twice, the entry that sorts
/// last by path wins.
pub fn iteration_versions(dir: &Path, options: &ScanOptions) -> BTreeMap<String, u32> {
    scan_archives(dir, options)
        .into_iter()
        .map(|summary| (summary.name, summary.iteration_version))
        .collect()
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::fixture::ArchiveBuilder;

    #[test]
    fn maps_names_to_versions() {
        let dir = tempfile::tempdir().unwrap();
        for (name, version) in [("client_general.dat", 501), ("client_sound.dat", 77)] {
            ArchiveBuilder::new()
                .version(version)
                .node(0x200, &[], &[])
                .write_to(&dir.path().join(name))
                .unwrap();
        }
        std::fs::write(dir.path().join("broken.dat"), b"nope").unwrap();

        let versions = iteration_versions(dir.path(), &ScanOptions::default());
        assert_eq!(versions.len(), 2);
        assert_eq!(versions["client_general.dat"], 501);
        assert_eq!(versions["client_sound.dat"], 77);
    }
}
