//! Multi-phase patch runs
//!
//! A [`PatchOrchestrator`] owns one installation root and runs at most one
//! download run at a time. Both run kinds share the same state machine:
//!
//! ```text
//! Idle -> FetchingManifest -> CheckingFiles -> Downloading <-> Verifying -> Complete
//!                 \                  \               \
//!                  +------------------+---------------+--> Failed
//! ```
//!
//! Game-file runs abort on the first failing file; splashscreen runs log
//! per-file failures and carry on. Every file is streamed into a `.tmp`
//! sibling and only renamed onto its destination once complete and, when the
//! manifest carries a digest, verified.

use bytes::Bytes;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};
use url::Url;

use lotro_dat::iteration_versions;
use parking_lot::Mutex;

use crate::cancel::CancelFlag;
use crate::config::PatchConfig;
use crate::download::{Downloader, TempFile, Transfer};
use crate::error::{PatchError, Result};
use crate::manifest::{parse_patching_manifest, parse_splashscreen_manifest};
use crate::paths::resolve_destination;
use crate::progress::{Phase, ProgressEvent, Reporter};
use crate::reconcile::UpdateCheck;
use crate::transport::{HttpClient, join_url, parse_base_url, parse_url};

/// Counts for a finished run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Files the run set out to download
    pub files_total: usize,
    /// Files downloaded, verified and committed
    pub files_completed: usize,
    /// Files left alone because they already existed
    pub files_skipped: usize,
    /// Splashscreens that could not be fetched
    pub files_failed: usize,
    /// Bytes accounted to completed files
    pub bytes_completed: u64,
}

/// Clears the running flag when a run ends, however it ends
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Drives manifest-based downloads into one installation root
#[derive(Debug)]
pub struct PatchOrchestrator {
    root: PathBuf,
    config: PatchConfig,
    http: HttpClient,
    running: AtomicBool,
    cancel: CancelFlag,
    last_error: Mutex<Option<String>>,
}

impl PatchOrchestrator {
    /// Create an orchestrator for the installation at `root`
    pub fn new(root: impl Into<PathBuf>, config: PatchConfig) -> Result<Self> {
        let http = HttpClient::new(&config)?;
        Ok(Self::with_client(root, config, http))
    }

    /// Create an orchestrator that uses an existing HTTP client
    pub fn with_client(root: impl Into<PathBuf>, config: PatchConfig, http: HttpClient) -> Self {
        Self {
            root: root.into(),
            config,
            http,
            running: AtomicBool::new(false),
            cancel: CancelFlag::new(),
            last_error: Mutex::new(None),
        }
    }

    /// Installation root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Settings used for every run
    pub fn config(&self) -> &PatchConfig {
        &self.config
    }

    /// Whether a run is in progress
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Message of the error that ended the most recent run, if it failed
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    /// Ask the current run to stop at its next check-point. Idempotent, and a
    /// no-op when nothing is running.
    pub fn cancel(&self) {
        if self.is_running() {
            info!("cancel requested");
        }
        self.cancel.cancel();
    }

    /// Iteration versions of the archives in the installation root
    pub fn current_versions(&self) -> BTreeMap<String, u32> {
        iteration_versions(&self.root, &self.config.scan)
    }

    /// Compare the installation's archive versions with `targets`.
    ///
    /// Archives are scanned and closed before this returns.
    pub fn check_for_updates(&self, targets: &BTreeMap<String, u32>) -> UpdateCheck {
        let check = UpdateCheck::compute(&self.current_versions(), targets);
        info!(
            "update check: {} archives found, {} behind target",
            check.current.len(),
            check.pending.len()
        );
        check
    }

    /// Download every splashscreen listed in the manifest at `manifest_url`.
    ///
    /// Individual files that fail are logged and skipped. Existing files are
    /// replaced.
    pub async fn run_splashscreens<F>(&self, manifest_url: &str, mut on_progress: F) -> Result<RunReport>
    where
        F: FnMut(&ProgressEvent) + Send,
    {
        let _guard = self.begin()?;
        let mut reporter = Reporter::new(&mut on_progress);
        let result = self.splashscreens(manifest_url, &mut reporter).await;
        self.conclude("splashscreen", result, &mut reporter)
    }

    /// Download every game file from the manifest at `manifest_url` that is
    /// not yet present, resolving sources against `base_url`.
    ///
    /// Any failing file aborts the run; files committed before the failure
    /// stay in place.
    pub async fn run_game_files<F>(
        &self,
        manifest_url: &str,
        base_url: &str,
        mut on_progress: F,
    ) -> Result<RunReport>
    where
        F: FnMut(&ProgressEvent) + Send,
    {
        let _guard = self.begin()?;
        let mut reporter = Reporter::new(&mut on_progress);
        let result = self.game_files(manifest_url, base_url, &mut reporter).await;
        self.conclude("game file", result, &mut reporter)
    }

    fn begin(&self) -> Result<RunGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| PatchError::AlreadyRunning)?;
        self.cancel.reset();
        *self.last_error.lock() = None;
        Ok(RunGuard(&self.running))
    }

    fn conclude(
        &self,
        kind: &str,
        result: Result<RunReport>,
        reporter: &mut Reporter<'_>,
    ) -> Result<RunReport> {
        match &result {
            Ok(report) => info!(
                "{kind} run complete: {} of {} files, {} bytes",
                report.files_completed, report.files_total, report.bytes_completed
            ),
            Err(e) => {
                if e.is_cancelled() {
                    info!("{kind} run cancelled");
                } else {
                    error!("{kind} run failed: {e}");
                }
                *self.last_error.lock() = Some(e.to_string());
                reporter.fail(e.to_string());
            }
        }
        result
    }

    async fn splashscreens(&self, manifest_url: &str, reporter: &mut Reporter<'_>) -> Result<RunReport> {
        let manifest_url = parse_url(manifest_url)?;

        reporter.phase(Phase::FetchingManifest, "Fetching manifest...");
        info!("fetching splashscreen manifest: {manifest_url}");
        let body = self.fetch_manifest(&manifest_url).await?;
        let items = parse_splashscreen_manifest(&body)?;
        drop(body);

        let mut report = RunReport {
            files_total: items.len(),
            ..RunReport::default()
        };

        if items.is_empty() {
            info!("no splashscreen files to download");
            reporter.phase(Phase::Complete, "No splashscreens to download");
            return Ok(report);
        }

        info!("found {} splashscreen files", items.len());
        reporter.set_totals(items.len(), 0);
        reporter.phase(
            Phase::Downloading,
            format!("Downloading {} splashscreens", items.len()),
        );

        for item in &items {
            self.cancel.check()?;

            let name = item.display_name();
            let label = item.description.as_deref().unwrap_or(name);
            reporter.start_file(name, None, format!("Downloading: {label}"));

            let stored = match resolve_destination(&self.root, &item.destination_rel_path) {
                Ok(dest) => match parse_url(&item.source_url) {
                    Ok(url) => self.store(name, &url, &dest, None, None, reporter).await,
                    Err(e) => Err(e),
                },
                Err(e) => Err(e),
            };

            match stored {
                Ok(transfer) => {
                    report.files_completed += 1;
                    report.bytes_completed += transfer.bytes;
                    reporter.finish_file(transfer.bytes);
                }
                Err(PatchError::Cancelled) => return Err(PatchError::Cancelled),
                Err(e) => {
                    warn!("failed to download splashscreen {name}: {e}");
                    report.files_failed += 1;
                }
            }
        }

        reporter.phase(Phase::Complete, "Complete");
        Ok(report)
    }

    async fn game_files(
        &self,
        manifest_url: &str,
        base_url: &str,
        reporter: &mut Reporter<'_>,
    ) -> Result<RunReport> {
        let manifest_url = parse_url(manifest_url)?;
        let base_url = parse_base_url(base_url)?;

        reporter.phase(Phase::FetchingManifest, "Fetching game file manifest...");
        info!("fetching game manifest: {manifest_url}");
        let body = self.fetch_manifest(&manifest_url).await?;
        let items = parse_patching_manifest(&body)?;
        drop(body);
        info!("found {} game files in manifest", items.len());

        self.cancel.check()?;
        reporter.phase(Phase::CheckingFiles, "Checking existing files...");

        let mut report = RunReport::default();
        let mut missing = Vec::new();
        let mut bytes_total = 0u64;

        for item in &items {
            let dest = resolve_destination(&self.root, &item.destination_rel_path)?;
            if tokio::fs::try_exists(&dest).await? {
                report.files_skipped += 1;
                continue;
            }
            let url = join_url(&base_url, &item.source_url)?;
            debug!("missing: {} from {url}", item.destination_rel_path);
            bytes_total = bytes_total.saturating_add(item.expected_size.unwrap_or(0));
            missing.push((item, dest, url));
        }

        report.files_total = missing.len();
        if missing.is_empty() {
            info!("no game files need downloading");
            reporter.phase(Phase::Complete, "Up to date");
            return Ok(report);
        }

        info!(
            "need to download {} files ({} bytes)",
            missing.len(),
            bytes_total
        );
        reporter.set_totals(missing.len(), bytes_total);
        reporter.phase(
            Phase::Downloading,
            format!("Downloading {} files", missing.len()),
        );

        for (item, dest, url) in missing {
            self.cancel.check()?;

            let name = item.destination_rel_path.as_str();
            reporter.start_file(name, item.expected_size, format!("Downloading: {name}"));

            let transfer = self
                .store(
                    name,
                    &url,
                    &dest,
                    item.md5_hex.as_deref(),
                    item.expected_size,
                    reporter,
                )
                .await?;

            let counted = item.expected_size.unwrap_or(transfer.bytes);
            report.files_completed += 1;
            report.bytes_completed += counted;
            reporter.finish_file(counted);
        }

        reporter.phase(
            Phase::Complete,
            format!("Downloaded {} files", report.files_completed),
        );
        Ok(report)
    }

    async fn fetch_manifest(&self, url: &Url) -> Result<Bytes> {
        let fetch = self
            .config
            .retry_policy
            .execute(|| self.http.fetch_url(url));

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(PatchError::Cancelled),
            body = fetch => body,
        }
    }

    fn downloader(&self) -> Downloader<'_> {
        Downloader {
            http: &self.http,
            cancel: &self.cancel,
            inactivity_timeout: self.config.inactivity_timeout,
            progress_interval: self.config.progress_interval_bytes.max(1),
        }
    }

    /// Download `url` to `dest` through a temp file, verifying `md5` when
    /// given. The destination is only touched by the final rename.
    async fn store(
        &self,
        name: &str,
        url: &Url,
        dest: &Path,
        md5: Option<&str>,
        expected_size: Option<u64>,
        reporter: &mut Reporter<'_>,
    ) -> Result<Transfer> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp = TempFile::for_destination(dest);
        let transfer = self
            .downloader()
            .fetch_to(name, url, &temp, |received| reporter.file_bytes(received))
            .await?;

        if let Some(expected) = md5 {
            reporter.phase(Phase::Verifying, format!("Verifying: {name}"));
            if !transfer.md5_hex.eq_ignore_ascii_case(expected) {
                return Err(PatchError::HashMismatch {
                    item: name.to_string(),
                    expected: expected.to_string(),
                    actual: transfer.md5_hex,
                });
            }
        }

        if let Some(size) = expected_size
            && size != transfer.bytes
        {
            warn!(
                "{name}: manifest announced {size} bytes, received {}",
                transfer.bytes
            );
        }

        temp.commit(dest).await?;
        debug!("committed {}", dest.display());
        Ok(transfer)
    }
}
