//! Download commands: splash and fetch

use anyhow::{Context, Result};
use lotro_patch::{PatchOrchestrator, Phase, ProgressEvent, RunReport};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::{InstallArgs, OutputFormat};

/// Cancels the run on Ctrl-C until dropped
struct InterruptGuard(JoinHandle<()>);

impl InterruptGuard {
    fn install(orchestrator: &Arc<PatchOrchestrator>) -> Self {
        let orchestrator = Arc::clone(orchestrator);
        Self(tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, cancelling");
                orchestrator.cancel();
            }
        }))
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn orchestrator(install: &InstallArgs) -> Result<Arc<PatchOrchestrator>> {
    std::fs::create_dir_all(&install.root)
        .with_context(|| format!("failed to create {}", install.root.display()))?;
    Ok(Arc::new(PatchOrchestrator::new(
        &install.root,
        install.config(),
    )?))
}

/// Progress callback: JSON lines, or a status line whenever the text changes
fn progress_printer(format: OutputFormat) -> impl FnMut(&ProgressEvent) + Send {
    let mut last_status = String::new();
    let mut last_phase = Phase::Idle;
    move |event| {
        if format.is_json() {
            if let Ok(line) = serde_json::to_string(event) {
                println!("{line}");
            }
            return;
        }
        if event.status_text != last_status || event.phase != last_phase {
            eprintln!("[{:>3}%] {}", event.percentage(), event.status_text);
            last_status.clone_from(&event.status_text);
            last_phase = event.phase;
        }
    }
}

fn print_report(report: &RunReport, format: OutputFormat) -> Result<()> {
    if format.is_json() {
        return format.print_json(report);
    }
    println!(
        "{} of {} files downloaded ({} bytes)",
        report.files_completed, report.files_total, report.bytes_completed
    );
    if report.files_skipped > 0 {
        println!("{} files already present", report.files_skipped);
    }
    if report.files_failed > 0 {
        println!("{} files failed", report.files_failed);
    }
    Ok(())
}

pub async fn splash(install: &InstallArgs, manifest_url: &str, format: OutputFormat) -> Result<()> {
    let orchestrator = orchestrator(install)?;
    let _interrupt = InterruptGuard::install(&orchestrator);

    let report = orchestrator
        .run_splashscreens(manifest_url, progress_printer(format))
        .await
        .context("splashscreen download failed")?;
    print_report(&report, format)
}

pub async fn fetch(
    install: &InstallArgs,
    manifest_url: &str,
    base_url: &str,
    format: OutputFormat,
) -> Result<()> {
    let orchestrator = orchestrator(install)?;
    let _interrupt = InterruptGuard::install(&orchestrator);

    let report = orchestrator
        .run_game_files(manifest_url, base_url, progress_printer(format))
        .await
        .context("game file download failed")?;
    print_report(&report, format)
}
