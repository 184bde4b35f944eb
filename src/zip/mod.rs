//! ZIP archive parsing and extraction.
//!
//! - [`structures`]: on-disk records (EOCD, ZIP64 records, central entries)
//! - [`parser`]: locating and walking the Central Directory
//! - [`extractor`]: streaming entries to disk
//!
//! STORED and DEFLATE entries are supported, as are ZIP64 archives.
//! Encrypted entries, other compression methods and multi-disk archives are
//! not; such entries are skipped during extraction.

mod extractor;
mod parser;
mod structures;

pub use extractor::{CHUNK_SIZE, ExtractReport, ZipExtractor};
pub use parser::{CentralDirectory, ZipParser};
pub use structures::*;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};

use crate::error::UpdateError;
use crate::io::LocalFileReader;

/// Unpacks a staged archive into a destination directory.
#[async_trait]
pub trait Extract: Send + Sync {
    async fn extract(&self, archive: &Path, dest: &Path) -> Result<ExtractReport, UpdateError>;
}

/// Extracts staged zip files with [`ZipExtractor`], deleting them afterwards.
pub struct StagedZipExtractor;

#[async_trait]
impl Extract for StagedZipExtractor {
    async fn extract(&self, archive: &Path, dest: &Path) -> Result<ExtractReport, UpdateError> {
        extract_staged(archive, dest).await
    }
}

/// Extract `archive` under `dest`, then delete `archive`.
///
/// The archive is removed whenever it could be opened, even if the walk
/// failed or skipped entries. Extraction is not transactional: entries
/// written before a failure stay on disk.
pub async fn extract_staged(archive: &Path, dest: &Path) -> Result<ExtractReport, UpdateError> {
    let reader = LocalFileReader::open(archive).map_err(|e| UpdateError::archive(archive, e))?;
    let result = ZipExtractor::new(Arc::new(reader)).extract_all(dest).await;

    if let Err(e) = tokio::fs::remove_file(archive).await {
        warn!("Could not remove {}: {}", archive.display(), e);
    }

    let report = result.map_err(|e| UpdateError::archive(archive, e))?;
    if report.truncated {
        warn!(
            "{} has a damaged Central Directory; later entries were not extracted",
            archive.display()
        );
    }
    info!(
        "Extracted {}: {} directories, {} files, {} skipped",
        archive.display(),
        report.directories,
        report.files,
        report.skipped
    );
    Ok(report)
}
