//! Error types surfaced to the user by update actions.
//!
//! Internal plumbing (archive parsing, data sources, startup) uses
//! `anyhow::Result`. The enums here are what an action reports back to the
//! menu, and every variant is terminal for that action only.

use std::path::PathBuf;

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A download that did not complete.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("could not initialise HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("could not create {}: {source}", .path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("request failed: {0}")]
    Network(#[source] reqwest::Error),

    #[error("server answered with status {0}")]
    Status(reqwest::StatusCode),

    #[error("could not write download: {0}")]
    Write(#[source] std::io::Error),
}

/// Why an update action failed.
#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("Download failed: {0}")]
    Transfer(#[from] TransferError),

    #[error("Could not read archive {}: {source}", .path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("Could not move {} to {}: {source}", .from.display(), .to.display())]
    Relocation {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl UpdateError {
    pub fn archive(path: impl Into<PathBuf>, source: anyhow::Error) -> Self {
        UpdateError::Archive {
            path: path.into(),
            source: source.into(),
        }
    }

    /// Short line shown on the report screen.
    pub fn headline(&self) -> &'static str {
        match self {
            UpdateError::Transfer(_) => "Download failed! Check Wi-Fi or link.",
            UpdateError::Archive { .. } => "Extraction failed! The archive could not be read.",
            UpdateError::Relocation { .. } => "Installed, but the payload could not be moved.",
        }
    }
}
