//! Manifest-driven content updates for LOTRO installations
//!
//! This crate fetches XML download manifests, decides which files an
//! installation still needs and streams them into place. Files are written to
//! a `.tmp` sibling first and only renamed onto their destination once the
//! transfer is complete and, when the manifest carries one, the MD5 digest
//! matches.
//!
//! Two kinds of run are supported:
//!
//! - **Splashscreens**: every listed image is downloaded from an absolute
//!   URL. A failing file is logged and skipped.
//! - **Game files**: only files missing from the installation are
//!   downloaded, resolved against a base URL. The first failure ends the run.
//!
//! Runs report progress through a caller supplied callback and can be
//! cancelled from any thread.
//!
//! # Example
//!
//! ```no_run
//! use lotro_patch::{PatchConfig, PatchOrchestrator};
//!
//! # async fn example() -> lotro_patch::Result<()> {
//! let orchestrator = PatchOrchestrator::new("/games/lotro", PatchConfig::from_env())?;
//! let report = orchestrator
//!     .run_game_files(
//!         "https://patch.example/lotro/files.xml",
//!         "https://patch.example/lotro/files/",
//!         |event| println!("{}% {}", event.percentage(), event.status_text),
//!     )
//!     .await?;
//! println!("downloaded {} files", report.files_completed);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod cancel;
pub mod config;
pub mod download;
pub mod error;
pub mod manifest;
pub mod orchestrator;
pub mod paths;
pub mod progress;
pub mod reconcile;
pub mod retry;
pub mod transport;

pub use cancel::CancelFlag;
pub use config::PatchConfig;
pub use download::{Downloader, TempFile, Transfer};
pub use error::{FailureReason, PatchError, Result};
pub use manifest::{DownloadItem, parse_patching_manifest, parse_splashscreen_manifest};
pub use orchestrator::{PatchOrchestrator, RunReport};
pub use paths::resolve_destination;
pub use progress::{Phase, ProgressEvent};
pub use reconcile::{PendingArchive, UpdateCheck};
pub use retry::RetryPolicy;
pub use transport::HttpClient;
