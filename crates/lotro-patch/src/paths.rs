//! Installation-relative destination paths

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use crate::error::{PatchError, Result};

/// Suffix of the sibling file a download is streamed into
pub const TEMP_SUFFIX: &str = ".tmp";

fn is_safe_relative_path(path: &Path) -> bool {
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::ParentDir => return false,
            _ => {}
        }
    }
    true
}

fn has_drive_prefix(rel: &str) -> bool {
    let bytes = rel.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Resolve a manifest destination under `root`.
///
/// Rejects empty paths, absolute paths, drive prefixes and any `..`
/// component, so a manifest can never write outside the installation.
pub fn resolve_destination(root: &Path, rel: &str) -> Result<PathBuf> {
    let trimmed = rel.trim();
    let path = Path::new(trimmed);
    let has_file = path
        .components()
        .any(|c| matches!(c, Component::Normal(_)));

    if trimmed.is_empty() || !has_file || has_drive_prefix(trimmed) || !is_safe_relative_path(path)
    {
        return Err(PatchError::UnsafePath(rel.to_string()));
    }

    Ok(root.join(path))
}

/// `dest` with [`TEMP_SUFFIX`] appended to its file name
pub fn temp_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(TEMP_SUFFIX);
    dest.with_file_name(name)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn joins_relative_paths() {
        let root = Path::new("/games/lotro");
        assert_eq!(
            resolve_destination(root, "client/textures/foo.dat").unwrap(),
            PathBuf::from("/games/lotro/client/textures/foo.dat")
        );
        assert_eq!(
            resolve_destination(root, "./splash.jpg").unwrap(),
            PathBuf::from("/games/lotro/./splash.jpg")
        );
    }

    #[test]
    fn rejects_escapes() {
        let root = Path::new("/games/lotro");
        for bad in [
            "",
            "   ",
            ".",
            "../outside.dat",
            "client/../../etc/passwd",
            "/etc/passwd",
            "C:/Windows/system.ini",
            "c:evil.dll",
        ] {
            assert!(
                matches!(
                    resolve_destination(root, bad),
                    Err(PatchError::UnsafePath(_))
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn temp_path_is_a_sibling() {
        assert_eq!(
            temp_path(Path::new("/games/lotro/client_general.dat")),
            PathBuf::from("/games/lotro/client_general.dat.tmp")
        );
    }
}
