//! Byte sources and sinks: random-access archive reading and HTTP downloads.

mod http;
mod local;

pub use http::HttpTransfer;
pub use local::LocalFileReader;

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

use crate::error::TransferError;

/// Trait for random access reading from a data source
#[async_trait]
pub trait ReadAt: Send + Sync {
    /// Read data at the specified offset into the buffer
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Get the total size of the data source
    fn size(&self) -> u64;
}

/// Progress callback receiving `(bytes_downloaded, bytes_total)`.
///
/// `bytes_total` is 0 when the server did not announce a length.
pub type Progress<'a> = &'a mut (dyn FnMut(u64, u64) + Send);

/// Downloads a URL into a local file.
#[async_trait]
pub trait Transfer: Send + Sync {
    /// Fetch `url` into `dest`, returning the number of bytes written.
    ///
    /// Passing a progress callback marks the transfer as interactive.
    async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        progress: Option<Progress<'_>>,
    ) -> Result<u64, TransferError>;
}
