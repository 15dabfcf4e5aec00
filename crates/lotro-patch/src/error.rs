//! Error types for manifest and download operations

use lotro_dat::DatError;
use std::fmt;
use thiserror::Error;

/// Why a network transfer did not produce a usable body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// No data arrived within the configured window
    Timeout,
    /// The server answered with a non-success status
    Status(u16),
    /// Connection, TLS or protocol failure
    Network(String),
    /// Local filesystem failure while storing the body
    Io(String),
    /// The server answered successfully with no content
    EmptyBody,
}

impl FailureReason {
    /// Classify a transport error
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if let Some(status) = err.status() {
            Self::Status(status.as_u16())
        } else {
            Self::Network(err.to_string())
        }
    }

    /// Whether retrying the same request might succeed
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Network(_) => true,
            Self::Status(status) => matches!(*status, 429 | 500 | 502 | 503 | 504),
            Self::Io(_) | Self::EmptyBody => false,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timed out"),
            Self::Status(status) => write!(f, "HTTP status {status}"),
            Self::Network(msg) => write!(f, "network error: {msg}"),
            Self::Io(msg) => write!(f, "I/O error: {msg}"),
            Self::EmptyBody => write!(f, "empty response body"),
        }
    }
}

/// Errors produced by manifest fetches and patch runs
#[derive(Debug, Error)]
pub enum PatchError {
    /// Local filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The HTTP client could not be built
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// The manifest is not well-formed XML
    #[error("malformed manifest: {0}")]
    BadManifest(String),

    /// The manifest could not be fetched
    #[error("manifest unreachable at {url}: {reason}")]
    ManifestUnreachable {
        /// Manifest URL
        url: String,
        /// What went wrong
        reason: FailureReason,
    },

    /// A file body could not be downloaded
    #[error("download of {item} failed: {reason}")]
    DownloadFailed {
        /// Destination of the file
        item: String,
        /// What went wrong
        reason: FailureReason,
    },

    /// A downloaded body does not match the manifest digest
    #[error("hash mismatch for {item}: expected {expected}, got {actual}")]
    HashMismatch {
        /// Destination of the file
        item: String,
        /// Digest from the manifest
        expected: String,
        /// Digest of the received bytes
        actual: String,
    },

    /// The run was cancelled
    #[error("cancelled")]
    Cancelled,

    /// Another run is in progress on the same orchestrator
    #[error("a patch run is already in progress")]
    AlreadyRunning,

    /// A URL could not be parsed or resolved under the base URL
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// A destination would land outside the installation root
    #[error("unsafe destination path: {0:?}")]
    UnsafePath(String),

    /// Reading an archive failed
    #[error("archive error: {0}")]
    Archive(#[from] DatError),
}

impl PatchError {
    /// Check if error is retryable
    pub fn should_retry(&self) -> bool {
        match self {
            Self::ManifestUnreachable { reason, .. } | Self::DownloadFailed { reason, .. } => {
                reason.is_transient()
            }
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Whether the run ended because of [`PatchOrchestrator::cancel`](crate::PatchOrchestrator::cancel)
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result type for patch operations
pub type Result<T> = std::result::Result<T, PatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_reasons_are_retried() {
        let unreachable = |reason| PatchError::ManifestUnreachable {
            url: "http://localhost/manifest.xml".to_string(),
            reason,
        };

        assert!(unreachable(FailureReason::Timeout).should_retry());
        assert!(unreachable(FailureReason::Status(503)).should_retry());
        assert!(unreachable(FailureReason::Network("reset".into())).should_retry());
        assert!(!unreachable(FailureReason::Status(404)).should_retry());
        assert!(!unreachable(FailureReason::EmptyBody).should_retry());
        assert!(!PatchError::Cancelled.should_retry());
        assert!(!PatchError::BadManifest("eof".into()).should_retry());
    }

    #[test]
    fn messages_name_the_item() {
        let err = PatchError::HashMismatch {
            item: "client/foo.dat".to_string(),
            expected: "aa".to_string(),
            actual: "bb".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "hash mismatch for client/foo.dat: expected aa, got bb"
        );

        let err = PatchError::DownloadFailed {
            item: "client/bar.dat".to_string(),
            reason: FailureReason::Timeout,
        };
        assert_eq!(err.to_string(), "download of client/bar.dat failed: timed out");
    }
}
