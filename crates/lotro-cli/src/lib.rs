//! LOTRO update client library
//!
//! Argument types and command handlers for the `lotro-update` binary.

pub mod commands;

use clap::{Args, Subcommand, ValueEnum};
use lotro_patch::{PatchConfig, RetryPolicy};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Plain text output
    #[default]
    Text,
    /// JSON output
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

impl OutputFormat {
    /// Whether the command should print structured output
    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json | Self::JsonPretty)
    }

    /// Print `value` as JSON in the selected style
    pub fn print_json<T: Serialize>(self, value: &T) -> anyhow::Result<()> {
        let text = match self {
            Self::JsonPretty => serde_json::to_string_pretty(value)?,
            Self::Json | Self::Text => serde_json::to_string(value)?,
        };
        println!("{text}");
        Ok(())
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the .dat archives in a directory with their versions
    Scan {
        /// Directory to scan
        dir: PathBuf,

        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,
    },

    /// Show an archive's superblock and entries
    Inspect {
        /// Archive file
        file: PathBuf,

        /// Show a single entry by id (hex, with or without 0x)
        #[arg(long, value_parser = parse_file_id)]
        id: Option<u32>,

        /// Write the selected entry's stored bytes to this path
        #[arg(long, requires = "id")]
        extract: Option<PathBuf>,

        /// Maximum number of entries to list
        #[arg(long, default_value = "50")]
        limit: usize,
    },

    /// Download the splashscreen images listed in a manifest
    Splash {
        #[command(flatten)]
        install: InstallArgs,

        /// Splashscreen manifest URL
        #[arg(long, env = "LOTRO_SPLASH_MANIFEST_URL")]
        manifest_url: String,
    },

    /// Download game files missing from an installation
    Fetch {
        #[command(flatten)]
        install: InstallArgs,

        /// Patching manifest URL
        #[arg(long, env = "LOTRO_PATCH_MANIFEST_URL")]
        manifest_url: String,

        /// Base URL the manifest's sources are relative to
        #[arg(long, env = "LOTRO_BASE_URL")]
        base_url: String,
    },

    /// Compare archive iteration versions with target versions
    Check {
        /// Installation directory
        #[arg(long, env = "LOTRO_ROOT")]
        root: PathBuf,

        /// Target version, as name=version (repeatable)
        #[arg(long = "target", value_parser = parse_target, required = true)]
        targets: Vec<(String, u32)>,

        /// Also check archives in subdirectories
        #[arg(short, long)]
        recursive: bool,
    },
}

/// Installation and transfer settings shared by the download commands
#[derive(Args, Debug, Clone)]
pub struct InstallArgs {
    /// Installation directory
    #[arg(long, env = "LOTRO_ROOT")]
    pub root: PathBuf,

    /// Deadline for a manifest request in seconds
    #[arg(long, value_name = "SECS")]
    pub manifest_timeout: Option<u64>,

    /// Abort a file download after this many seconds without data
    #[arg(long, value_name = "SECS")]
    pub inactivity_timeout: Option<u64>,

    /// Retries for a failed manifest request
    #[arg(long)]
    pub max_retries: Option<u32>,
}

impl InstallArgs {
    /// Environment configuration with command-line overrides applied
    pub fn config(&self) -> PatchConfig {
        let mut config = PatchConfig::from_env();
        if let Some(secs) = self.manifest_timeout {
            config = config.with_manifest_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.inactivity_timeout {
            config = config.with_inactivity_timeout(Duration::from_secs(secs));
        }
        if let Some(max_attempts) = self.max_retries {
            let policy = RetryPolicy {
                max_attempts,
                ..config.retry_policy.clone()
            };
            config = config.with_retry_policy(policy);
        }
        config
    }
}

/// Parse a file id written in hex, with or without a `0x` prefix
pub fn parse_file_id(s: &str) -> Result<u32, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u32::from_str_radix(digits, 16).map_err(|e| format!("invalid file id {s:?}: {e}"))
}

/// Parse a `name=version` target
pub fn parse_target(s: &str) -> Result<(String, u32), String> {
    let (name, version) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=version, got {s:?}"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing archive name in {s:?}"));
    }
    let version = version
        .trim()
        .parse()
        .map_err(|e| format!("invalid version in {s:?}: {e}"))?;
    Ok((name.to_string(), version))
}
