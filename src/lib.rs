//! # cfw-updater
//!
//! A menu-driven updater for console homebrew setups: it downloads the
//! custom firmware, the bootloader, optional firmware packs or its own
//! executable from fixed release URLs and installs them onto the storage
//! root.
//!
//! The program is strictly sequential. An action is a fixed pipeline:
//!
//! 1. confirm with the user
//! 2. download the archive ([`io::HttpTransfer`])
//! 3. extract it over the destination ([`zip::extract_staged`])
//! 4. optionally move one file into place
//! 5. report and wait for acknowledgement
//!
//! The display, the input, the downloader, the extractor and the power
//! control are all traits, so the whole pipeline runs headless in tests.
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use cfw_updater::io::{HttpTransfer, Transfer};
//! use cfw_updater::power::NoopInhibitor;
//! use cfw_updater::zip::extract_staged;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let transfer = HttpTransfer::new("example/1.0", Arc::new(NoopInhibitor));
//!     let staged = Path::new("/tmp/pack.zip");
//!     transfer.fetch("https://example.com/pack.zip", staged, None).await?;
//!     let report = extract_staged(staged, Path::new("/tmp/pack")).await?;
//!     println!("{} files", report.files);
//!     Ok(())
//! }
//! ```

pub mod action;
pub mod cli;
pub mod config;
pub mod error;
pub mod io;
pub mod menu;
pub mod power;
pub mod probe;
pub mod ui;
pub mod zip;

pub use action::{ActionOutcome, ActionRunner, Services};
pub use cli::Cli;
pub use config::UpdaterConfig;
pub use error::{TransferError, UpdateError};
pub use menu::{Menu, MenuExit, ReleaseVersions};
