use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use flate2::{Decompress, FlushDecompress, Status};
use log::{debug, info, warn};
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::io::ReadAt;

use super::parser::ZipParser;
use super::structures::{CompressionMethod, ZipFileEntry};

/// Size of the read and write chunks used while inflating entries.
pub const CHUNK_SIZE: usize = 8192;

/// What an extraction run did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExtractReport {
    pub directories: usize,
    pub files: usize,
    /// Entries that could not be written and were passed over.
    pub skipped: usize,
    /// The walk stopped at a damaged Central Directory record.
    pub truncated: bool,
}

/// ZIP file extractor
pub struct ZipExtractor<R: ReadAt> {
    parser: ZipParser<R>,
}

impl<R: ReadAt> ZipExtractor<R> {
    pub fn new(reader: Arc<R>) -> Self {
        Self {
            parser: ZipParser::new(reader),
        }
    }

    /// All entries, in archive order.
    pub async fn list_files(&self) -> Result<Vec<ZipFileEntry>> {
        self.parser.central_directory().await?.collect()
    }

    /// Extract every entry under `dest`.
    ///
    /// Only archive-level damage is an error. Entries that cannot be written
    /// are logged and counted in the report.
    pub async fn extract_all(&self, dest: &Path) -> Result<ExtractReport> {
        let directory = self.parser.central_directory().await?;
        fs::create_dir_all(dest)
            .await
            .with_context(|| format!("Failed to create {}", dest.display()))?;

        info!(
            "Extracting {} entries into {}",
            directory.len(),
            dest.display()
        );

        let mut report = ExtractReport::default();
        for record in directory {
            let entry = match record {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Stopping extraction early: {:#}", e);
                    report.truncated = true;
                    break;
                }
            };

            let Some(relative) = entry.relative_path() else {
                warn!("Skipping entry with unsafe name {:?}", entry.file_name);
                report.skipped += 1;
                continue;
            };
            let output_path = dest.join(relative);

            if entry.is_directory {
                match fs::create_dir_all(&output_path).await {
                    Ok(()) => report.directories += 1,
                    Err(e) => {
                        warn!("Skipping directory {}: {}", output_path.display(), e);
                        report.skipped += 1;
                    }
                }
                continue;
            }

            match self.extract_to_file(&entry, &output_path).await {
                Ok(written) => {
                    if written != entry.uncompressed_size {
                        warn!(
                            "{}: wrote {} bytes, directory says {}",
                            entry.file_name, written, entry.uncompressed_size
                        );
                    }
                    debug!("  extracted: {} ({} bytes)", entry.file_name, written);
                    report.files += 1;
                }
                Err(e) => {
                    warn!("Skipping {}: {:#}", entry.file_name, e);
                    report.skipped += 1;
                }
            }
        }

        Ok(report)
    }

    /// Extract one file entry, creating its parent directories first.
    pub async fn extract_to_file(&self, entry: &ZipFileEntry, output_path: &Path) -> Result<u64> {
        if entry.is_encrypted() {
            bail!("Encrypted entries are not supported");
        }
        if let CompressionMethod::Unknown(method) = entry.compression_method {
            bail!("Unsupported compression method: {}", method);
        }
        let data_offset = self.parser.get_data_offset(entry).await?;

        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let mut file = fs::File::create(output_path).await?;
        let written = self.copy_entry(entry, data_offset, &mut file).await?;
        file.flush().await?;
        Ok(written)
    }

    /// Stream an entry's decompressed bytes into `out`, chunk by chunk.
    pub async fn copy_entry<W: AsyncWrite + Unpin + Send>(
        &self,
        entry: &ZipFileEntry,
        data_offset: u64,
        out: &mut W,
    ) -> Result<u64> {
        match entry.compression_method {
            CompressionMethod::Stored => self.copy_stored(entry, data_offset, out).await,
            CompressionMethod::Deflate => self.copy_deflated(entry, data_offset, out).await,
            CompressionMethod::Unknown(method) => {
                bail!("Unsupported compression method: {}", method)
            }
        }
    }

    async fn read_chunk(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let n = self.parser.reader().read_at(offset, buf).await?;
        if n != buf.len() {
            bail!("Archive ended inside entry data");
        }
        Ok(())
    }

    async fn copy_stored<W: AsyncWrite + Unpin + Send>(
        &self,
        entry: &ZipFileEntry,
        data_offset: u64,
        out: &mut W,
    ) -> Result<u64> {
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut offset = data_offset;
        let mut remaining = entry.compressed_size;

        while remaining > 0 {
            let len = remaining.min(CHUNK_SIZE as u64) as usize;
            self.read_chunk(offset, &mut buf[..len]).await?;
            out.write_all(&buf[..len]).await?;
            offset += len as u64;
            remaining -= len as u64;
        }

        Ok(entry.compressed_size)
    }

    async fn copy_deflated<W: AsyncWrite + Unpin + Send>(
        &self,
        entry: &ZipFileEntry,
        data_offset: u64,
        out: &mut W,
    ) -> Result<u64> {
        // ZIP stores raw DEFLATE streams without a zlib header
        let mut inflater = Decompress::new(false);
        let mut input = vec![0u8; CHUNK_SIZE];
        let mut output = vec![0u8; CHUNK_SIZE];
        let mut offset = data_offset;
        let mut remaining = entry.compressed_size;
        let (mut start, mut end) = (0usize, 0usize);
        let mut written = 0u64;

        loop {
            if start == end && remaining > 0 {
                let len = remaining.min(CHUNK_SIZE as u64) as usize;
                self.read_chunk(offset, &mut input[..len]).await?;
                offset += len as u64;
                remaining -= len as u64;
                start = 0;
                end = len;
            }

            let in_before = inflater.total_in();
            let out_before = inflater.total_out();
            let status =
                inflater.decompress(&input[start..end], &mut output, FlushDecompress::None)?;
            let consumed = (inflater.total_in() - in_before) as usize;
            let produced = (inflater.total_out() - out_before) as usize;

            start += consumed;
            if produced > 0 {
                out.write_all(&output[..produced]).await?;
                written += produced as u64;
            }

            if status == Status::StreamEnd {
                break;
            }
            if consumed == 0 && produced == 0 && start == end && remaining == 0 {
                bail!("Truncated DEFLATE stream");
            }
        }

        Ok(written)
    }
}
