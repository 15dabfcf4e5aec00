//! Offline archive commands: scan, inspect and check

use anyhow::{Context, Result, ensure};
use lotro_dat::{DatArchive, EntryRecord, Superblock, scan_archives};
use lotro_patch::{PatchConfig, PatchOrchestrator, UpdateCheck};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::scan_options;
use crate::OutputFormat;

pub fn scan(dir: &Path, recursive: bool, format: OutputFormat) -> Result<()> {
    ensure!(dir.is_dir(), "{} is not a directory", dir.display());

    let summaries = scan_archives(dir, &scan_options(recursive));
    if format.is_json() {
        return format.print_json(&summaries);
    }

    if summaries.is_empty() {
        println!("No archives found in {}", dir.display());
        return Ok(());
    }

    println!(
        "{:<36} {:>10} {:>12} {:>10}",
        "Archive", "Iteration", "Max entry", "Files"
    );
    for summary in &summaries {
        println!(
            "{:<36} {:>10} {:>12} {:>10}",
            summary.name, summary.iteration_version, summary.max_entry_version, summary.entry_count
        );
    }
    println!("{} archives", summaries.len());
    Ok(())
}

#[derive(Serialize)]
struct Inspection<'a> {
    path: &'a Path,
    superblock: &'a Superblock,
    file_count: usize,
    max_entry_version: u32,
    entries: &'a [EntryRecord],
}

pub fn inspect(
    file: &Path,
    id: Option<u32>,
    extract: Option<&PathBuf>,
    limit: usize,
    format: OutputFormat,
) -> Result<()> {
    let archive =
        DatArchive::open(file).with_context(|| format!("failed to open {}", file.display()))?;

    if let Some(id) = id {
        let entry = *archive
            .find(id)
            .with_context(|| format!("no entry {id:08X} in {}", file.display()))?;

        if let Some(out) = extract {
            let payload = archive.extract(&entry)?;
            if payload.compressed {
                warn!(
                    "entry {id:08X} is compressed; writing {} stored bytes ({} when expanded)",
                    payload.data.len(),
                    payload.logical_size
                );
            }
            std::fs::write(out, &payload.data)
                .with_context(|| format!("failed to write {}", out.display()))?;
            info!("extracted {id:08X} to {}", out.display());
        }

        if format.is_json() {
            return format.print_json(&entry);
        }
        println!("{entry}");
        return Ok(());
    }

    let shown = &archive.entries()[..archive.file_count().min(limit)];
    if format.is_json() {
        return format.print_json(&Inspection {
            path: file,
            superblock: archive.superblock(),
            file_count: archive.file_count(),
            max_entry_version: archive.max_entry_version(),
            entries: shown,
        });
    }

    let sb = archive.superblock();
    println!("{}", file.display());
    println!("  Iteration version: {}", sb.version);
    println!("  Secondary version: {}", sb.version2);
    println!("  Block size:        {}", sb.block_size);
    println!("  File size:         {}", sb.file_size);
    println!("  Root directory:    0x{:08X}", sb.directory_offset);
    println!(
        "  Free list:         head 0x{:08X}, tail 0x{:08X}, {} blocks",
        sb.free_head, sb.free_tail, sb.free_size
    );
    println!("  Files:             {}", archive.file_count());
    println!("  Max entry version: {}", archive.max_entry_version());

    if !shown.is_empty() {
        println!();
        for entry in shown {
            println!("  {entry}");
        }
        if archive.file_count() > shown.len() {
            println!("  ... {} more", archive.file_count() - shown.len());
        }
    }
    Ok(())
}

/// Returns whether the installation is up to date
pub fn check(
    root: &Path,
    targets: Vec<(String, u32)>,
    recursive: bool,
    format: OutputFormat,
) -> Result<bool> {
    ensure!(root.is_dir(), "{} is not a directory", root.display());

    let config = PatchConfig::from_env().with_scan_options(scan_options(recursive));
    let orchestrator = PatchOrchestrator::new(root, config)?;
    let targets: BTreeMap<String, u32> = targets.into_iter().collect();
    let check = orchestrator.check_for_updates(&targets);

    if format.is_json() {
        format.print_json(&check)?;
    } else {
        print_check(&check);
    }
    Ok(check.is_up_to_date())
}

fn print_check(check: &UpdateCheck) {
    if check.is_up_to_date() {
        println!("Up to date");
        return;
    }
    for pending in &check.pending {
        match pending.current {
            Some(current) => println!(
                "{}: version {} is behind target {}",
                pending.name, current, pending.target
            ),
            None => println!("{}: missing (target {})", pending.name, pending.target),
        }
    }
    println!("{} archives need updating", check.pending.len());
}
