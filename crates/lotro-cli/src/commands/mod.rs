//! Command handlers

pub mod archive;
pub mod patch;

use lotro_dat::ScanOptions;

/// Scan options from the environment, with recursion forced on by a flag
fn scan_options(recursive: bool) -> ScanOptions {
    let options = ScanOptions::from_env();
    if recursive {
        options.recursive(true)
    } else {
        options
    }
}
