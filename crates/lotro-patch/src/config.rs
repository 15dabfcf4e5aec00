//! Configuration for patch runs

use lotro_dat::ScanOptions;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Default user agent sent with every request
pub const DEFAULT_USER_AGENT: &str = concat!("lotro-patch/", env!("CARGO_PKG_VERSION"));

/// Settings shared by every run of a [`PatchOrchestrator`](crate::PatchOrchestrator)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchConfig {
    /// Deadline for a whole manifest request, per attempt
    pub manifest_timeout: Duration,

    /// Longest gap between two body chunks of a file download
    pub inactivity_timeout: Duration,

    /// TCP connect timeout
    pub connect_timeout: Duration,

    /// Minimum number of new bytes between intra-file progress events
    pub progress_interval_bytes: u64,

    /// User agent header
    pub user_agent: String,

    /// Retry policy for manifest fetches; file downloads are never retried
    pub retry_policy: RetryPolicy,

    /// How installation archives are discovered for update checks
    pub scan: ScanOptions,
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            manifest_timeout: Duration::from_secs(30),
            inactivity_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            progress_interval_bytes: 64 * 1024,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            retry_policy: RetryPolicy::default(),
            scan: ScanOptions::default(),
        }
    }
}

impl PatchConfig {
    /// Defaults overridden by `LOTRO_*` environment variables.
    ///
    /// Timeouts are read in seconds, the progress interval in bytes.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            manifest_timeout: env_secs("LOTRO_MANIFEST_TIMEOUT")
                .unwrap_or(defaults.manifest_timeout),
            inactivity_timeout: env_secs("LOTRO_INACTIVITY_TIMEOUT")
                .unwrap_or(defaults.inactivity_timeout),
            connect_timeout: env_secs("LOTRO_CONNECT_TIMEOUT")
                .unwrap_or(defaults.connect_timeout),
            progress_interval_bytes: std::env::var("LOTRO_PROGRESS_INTERVAL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.progress_interval_bytes),
            user_agent: std::env::var("LOTRO_USER_AGENT")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.user_agent),
            retry_policy: RetryPolicy::from_env(),
            scan: ScanOptions::from_env(),
        }
    }

    /// Override the manifest deadline
    #[must_use]
    pub const fn with_manifest_timeout(mut self, timeout: Duration) -> Self {
        self.manifest_timeout = timeout;
        self
    }

    /// Override the download inactivity window
    #[must_use]
    pub const fn with_inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.inactivity_timeout = timeout;
        self
    }

    /// Override the retry policy
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Override archive discovery
    #[must_use]
    pub fn with_scan_options(mut self, scan: ScanOptions) -> Self {
        self.scan = scan;
        self
    }
}

fn env_secs(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .map(Duration::from_secs)
}
