//! Progress events emitted during a run

use serde::Serialize;
use std::fmt;

/// State machine phase of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum Phase {
    /// No run has started
    #[default]
    Idle,
    /// Requesting the manifest
    FetchingManifest,
    /// Looking for files already on disk
    CheckingFiles,
    /// Streaming a file body
    Downloading,
    /// Comparing a file's digest
    Verifying,
    /// The run finished
    Complete,
    /// The run ended with an error
    Failed,
}

impl Phase {
    /// Whether the run has ended
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::FetchingManifest => "fetching manifest",
            Self::CheckingFiles => "checking files",
            Self::Downloading => "downloading",
            Self::Verifying => "verifying",
            Self::Complete => "complete",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Snapshot of a run, handed to the progress callback
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    /// Current phase
    pub phase: Phase,
    /// Files finished so far
    pub files_completed: usize,
    /// Files the run will download
    pub files_total: usize,
    /// Expected sizes of the files finished so far
    pub bytes_completed: u64,
    /// Sum of the expected sizes of all files to download
    pub bytes_total: u64,
    /// Destination of the file being processed
    pub current_name: Option<String>,
    /// Human readable status line
    pub status_text: String,
    /// Error message once the run has failed
    pub error: Option<String>,
    /// Bytes received so far for the current file
    pub file_bytes_received: u64,
    /// Size the manifest announced for the current file
    pub file_bytes_expected: Option<u64>,
}

impl ProgressEvent {
    /// Overall completion in percent.
    ///
    /// Byte based when the manifest announced sizes, file based otherwise.
    pub fn percentage(&self) -> u8 {
        let (done, total) = if self.bytes_total > 0 {
            (
                self.bytes_completed.saturating_add(self.file_bytes_received),
                self.bytes_total,
            )
        } else if self.files_total > 0 {
            (self.files_completed as u64, self.files_total as u64)
        } else {
            return if self.phase == Phase::Complete { 100 } else { 0 };
        };
        (done.saturating_mul(100) / total).min(100) as u8
    }
}

/// Owns the current snapshot and forwards it to the caller's callback
pub(crate) struct Reporter<'a> {
    event: ProgressEvent,
    sink: &'a mut (dyn FnMut(&ProgressEvent) + Send),
}

impl<'a> Reporter<'a> {
    pub(crate) fn new(sink: &'a mut (dyn FnMut(&ProgressEvent) + Send)) -> Self {
        Self {
            event: ProgressEvent::default(),
            sink,
        }
    }

    pub(crate) fn emit(&mut self) {
        (self.sink)(&self.event);
    }

    /// Transition to `phase` and emit
    pub(crate) fn phase(&mut self, phase: Phase, status: impl Into<String>) {
        self.event.phase = phase;
        self.event.status_text = status.into();
        self.emit();
    }

    pub(crate) fn set_totals(&mut self, files_total: usize, bytes_total: u64) {
        self.event.files_total = files_total;
        self.event.bytes_total = bytes_total;
    }

    /// Announce the next file and emit
    pub(crate) fn start_file(&mut self, name: &str, expected: Option<u64>, status: String) {
        self.event.phase = Phase::Downloading;
        self.event.current_name = Some(name.to_string());
        self.event.file_bytes_received = 0;
        self.event.file_bytes_expected = expected;
        self.event.status_text = status;
        self.emit();
    }

    /// Report bytes received for the current file and emit
    pub(crate) fn file_bytes(&mut self, received: u64) {
        self.event.file_bytes_received = received;
        self.emit();
    }

    /// Count a finished file and emit
    pub(crate) fn finish_file(&mut self, bytes: u64) {
        self.event.phase = Phase::Downloading;
        self.event.files_completed += 1;
        self.event.bytes_completed = self.event.bytes_completed.saturating_add(bytes);
        self.event.file_bytes_received = 0;
        self.emit();
    }

    /// Terminal failure event
    pub(crate) fn fail(&mut self, error: String) {
        self.event.phase = Phase::Failed;
        self.event.status_text = format!("Failed: {error}");
        self.event.error = Some(error);
        self.emit();
    }
}
