//! Low-level ZIP archive parser.
//!
//! Reads from any [`ReadAt`] source. The archive is located from its tail:
//! the End of Central Directory record (and its ZIP64 twin when needed) gives
//! the position of the Central Directory, which is loaded in one read and
//! then walked record by record through [`CentralDirectory`].

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};
use std::sync::Arc;

use crate::io::ReadAt;
use anyhow::{Result, bail};

use super::structures::*;

/// Maximum ZIP comment size allowed by the format (65535 bytes).
const MAX_COMMENT_SIZE: u64 = 65535;

/// ZIP64 extended information extra field id.
const ZIP64_EXTRA_ID: u16 = 0x0001;

pub struct ZipParser<R: ReadAt> {
    reader: Arc<R>,
    size: u64,
}

impl<R: ReadAt> ZipParser<R> {
    pub fn new(reader: Arc<R>) -> Self {
        let size = reader.size();
        Self { reader, size }
    }

    async fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let n = self.reader.read_at(offset, buf).await?;
        if n != buf.len() {
            bail!("Unexpected end of archive at offset {}", offset);
        }
        Ok(())
    }

    /// Locate the End of Central Directory record.
    ///
    /// Returns the record together with its offset in the archive.
    pub async fn find_eocd(&self) -> Result<(EndOfCentralDirectory, u64)> {
        if self.size < EndOfCentralDirectory::SIZE as u64 {
            bail!("Not a valid ZIP file");
        }

        // Common case first: no archive comment, record sits at the very end.
        let offset = self.size - EndOfCentralDirectory::SIZE as u64;
        let mut buf = vec![0u8; EndOfCentralDirectory::SIZE];
        self.read_exact_at(offset, &mut buf).await?;
        if &buf[0..4] == EndOfCentralDirectory::SIGNATURE && buf[20..22] == [0, 0] {
            return Ok((EndOfCentralDirectory::from_bytes(&buf)?, offset));
        }

        // Otherwise scan the tail backwards for a record whose comment length
        // reaches exactly to the end of the file.
        let search_size = (MAX_COMMENT_SIZE + EndOfCentralDirectory::SIZE as u64).min(self.size);
        let search_start = self.size - search_size;
        let mut tail = vec![0u8; search_size as usize];
        self.read_exact_at(search_start, &mut tail).await?;

        for i in (0..=tail.len() - EndOfCentralDirectory::SIZE).rev() {
            if &tail[i..i + 4] != EndOfCentralDirectory::SIGNATURE {
                continue;
            }
            let comment_len = u16::from_le_bytes([tail[i + 20], tail[i + 21]]) as usize;
            if comment_len == tail.len() - i - EndOfCentralDirectory::SIZE {
                let eocd =
                    EndOfCentralDirectory::from_bytes(&tail[i..i + EndOfCentralDirectory::SIZE])?;
                return Ok((eocd, search_start + i as u64));
            }
        }

        bail!("Not a valid ZIP file")
    }

    /// Read the ZIP64 record referenced by the locator just before the EOCD.
    pub async fn read_zip64_eocd(&self, eocd_offset: u64) -> Result<Zip64EOCD> {
        let Some(locator_offset) = eocd_offset.checked_sub(Zip64EOCDLocator::SIZE as u64) else {
            bail!("Missing ZIP64 locator");
        };
        let mut locator_buf = vec![0u8; Zip64EOCDLocator::SIZE];
        self.read_exact_at(locator_offset, &mut locator_buf).await?;
        let locator = Zip64EOCDLocator::from_bytes(&locator_buf)?;

        let mut eocd64_buf = vec![0u8; Zip64EOCD::MIN_SIZE];
        self.read_exact_at(locator.eocd64_offset, &mut eocd64_buf)
            .await?;
        Zip64EOCD::from_bytes(&eocd64_buf)
    }

    /// Load the whole Central Directory.
    ///
    /// Fails when the archive-level records are missing or damaged. Damage
    /// inside individual records only shows up while iterating.
    pub async fn central_directory(&self) -> Result<CentralDirectory> {
        let (eocd, eocd_offset) = self.find_eocd().await?;

        let (cd_offset, cd_size, total_entries) = if eocd.is_zip64() {
            let eocd64 = self.read_zip64_eocd(eocd_offset).await?;
            (eocd64.cd_offset, eocd64.cd_size, eocd64.total_entries)
        } else {
            (
                eocd.cd_offset as u64,
                eocd.cd_size as u64,
                eocd.total_entries as u64,
            )
        };

        if cd_offset.saturating_add(cd_size) > self.size {
            bail!("Central Directory lies outside the archive");
        }

        let mut data = vec![0u8; cd_size as usize];
        self.read_exact_at(cd_offset, &mut data).await?;

        Ok(CentralDirectory {
            cursor: Cursor::new(data),
            remaining: total_entries,
        })
    }

    /// Offset of an entry's compressed data.
    ///
    /// The local header repeats the name and carries its own extra field,
    /// whose length may differ from the central record.
    pub async fn get_data_offset(&self, entry: &ZipFileEntry) -> Result<u64> {
        let mut lfh = vec![0u8; LFH_SIZE];
        self.read_exact_at(entry.lfh_offset, &mut lfh).await?;

        if &lfh[0..4] != LFH_SIGNATURE {
            bail!("Invalid Local File Header for {}", entry.file_name);
        }

        let mut cursor = Cursor::new(&lfh[26..]);
        let file_name_length = cursor.read_u16::<LittleEndian>()? as u64;
        let extra_field_length = cursor.read_u16::<LittleEndian>()? as u64;

        let data_offset =
            entry.lfh_offset + LFH_SIZE as u64 + file_name_length + extra_field_length;
        if data_offset.saturating_add(entry.compressed_size) > self.size {
            bail!("Data of {} runs past the end of the archive", entry.file_name);
        }
        Ok(data_offset)
    }

    pub fn reader(&self) -> &Arc<R> {
        &self.reader
    }
}

/// In-memory Central Directory, yielding entries in archive order.
///
/// Iteration stops after the announced number of entries or at the first
/// record that cannot be parsed; the error is yielded once.
pub struct CentralDirectory {
    cursor: Cursor<Vec<u8>>,
    remaining: u64,
}

impl CentralDirectory {
    pub fn len(&self) -> u64 {
        self.remaining
    }

    pub fn is_empty(&self) -> bool {
        self.remaining == 0
    }

    fn parse_record(&mut self) -> Result<ZipFileEntry> {
        let cursor = &mut self.cursor;
        let cd_len = cursor.get_ref().len() as u64;
        let left = cd_len.saturating_sub(cursor.position());
        if left < CDFH_MIN_SIZE as u64 {
            bail!("Central Directory is truncated");
        }

        let mut sig = [0u8; 4];
        cursor.read_exact(&mut sig)?;
        if sig != CDFH_SIGNATURE {
            bail!("Invalid Central Directory File Header");
        }

        // version made by, version needed
        cursor.set_position(cursor.position() + 4);
        let flags = cursor.read_u16::<LittleEndian>()?;
        let compression_method = cursor.read_u16::<LittleEndian>()?;
        // mod time, mod date, crc32
        cursor.set_position(cursor.position() + 8);
        let mut compressed_size = cursor.read_u32::<LittleEndian>()? as u64;
        let mut uncompressed_size = cursor.read_u32::<LittleEndian>()? as u64;
        let file_name_length = cursor.read_u16::<LittleEndian>()?;
        let extra_field_length = cursor.read_u16::<LittleEndian>()?;
        let file_comment_length = cursor.read_u16::<LittleEndian>()?;
        // disk number start, internal and external attributes
        cursor.set_position(cursor.position() + 8);
        let mut lfh_offset = cursor.read_u32::<LittleEndian>()? as u64;

        let mut file_name_bytes = vec![0u8; file_name_length as usize];
        cursor.read_exact(&mut file_name_bytes)?;
        let file_name = String::from_utf8_lossy(&file_name_bytes).into_owned();

        let extra_field_end = cursor.position() + extra_field_length as u64;
        let record_end = extra_field_end + file_comment_length as u64;
        if record_end > cd_len {
            bail!("Central Directory record for {} overruns the directory", file_name);
        }
        while cursor.position() + 4 <= extra_field_end {
            let header_id = cursor.read_u16::<LittleEndian>()?;
            let field_size = cursor.read_u16::<LittleEndian>()? as u64;
            let field_end = cursor.position() + field_size;

            if header_id == ZIP64_EXTRA_ID {
                // Only the header fields saturated to 0xFFFFFFFF are present,
                // in this fixed order.
                if uncompressed_size == 0xFFFFFFFF && cursor.position() + 8 <= field_end {
                    uncompressed_size = cursor.read_u64::<LittleEndian>()?;
                }
                if compressed_size == 0xFFFFFFFF && cursor.position() + 8 <= field_end {
                    compressed_size = cursor.read_u64::<LittleEndian>()?;
                }
                if lfh_offset == 0xFFFFFFFF && cursor.position() + 8 <= field_end {
                    lfh_offset = cursor.read_u64::<LittleEndian>()?;
                }
            }
            cursor.set_position(field_end);
        }
        cursor.set_position(record_end);

        Ok(ZipFileEntry {
            is_directory: file_name.ends_with('/'),
            file_name,
            flags,
            compression_method: CompressionMethod::from_u16(compression_method),
            compressed_size,
            uncompressed_size,
            lfh_offset,
        })
    }
}

impl Iterator for CentralDirectory {
    type Item = Result<ZipFileEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        match self.parse_record() {
            Ok(entry) => {
                self.remaining -= 1;
                Some(Ok(entry))
            }
            Err(e) => {
                self.remaining = 0;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::LocalFileReader;
    use ::zip::write::SimpleFileOptions;
    use std::io::Write;
    use std::path::Path;

    fn zip_with(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ::zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(::zip::CompressionMethod::Stored);
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn first_central_record(bytes: &[u8]) -> usize {
        bytes
            .windows(4)
            .position(|w| w == CDFH_SIGNATURE)
            .unwrap()
    }

    fn parser(path: &Path, bytes: &[u8]) -> ZipParser<LocalFileReader> {
        std::fs::write(path, bytes).unwrap();
        ZipParser::new(Arc::new(LocalFileReader::open(path).unwrap()))
    }

    #[tokio::test]
    async fn test_walks_records_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = zip_with(&[("one.txt", &b"1"[..]), ("two.txt", &b"22"[..])]);

        let entries: Vec<_> = parser(&dir.path().join("a.zip"), &bytes)
            .central_directory()
            .await
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        let sizes: Vec<_> = entries.iter().map(|e| e.compressed_size).collect();
        assert_eq!(sizes, [1, 2]);
    }

    #[tokio::test]
    async fn test_overlong_comment_stops_walk() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = zip_with(&[("one.txt", &b"1"[..]), ("two.txt", &b"2"[..])]);
        // comment length of the first central record
        let at = first_central_record(&bytes) + 32;
        bytes[at..at + 2].copy_from_slice(&0xFFFFu16.to_le_bytes());

        let records: Vec<_> = parser(&dir.path().join("bad.zip"), &bytes)
            .central_directory()
            .await
            .unwrap()
            .collect();
        assert_eq!(records.len(), 1);
        assert!(records[0].is_err());
    }

    #[tokio::test]
    async fn test_directory_outside_archive() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = zip_with(&[("one.txt", &b"1"[..])]);
        // cd_offset field of the EOCD at the tail
        let at = bytes.len() - EndOfCentralDirectory::SIZE + 16;
        bytes[at..at + 4].copy_from_slice(&0x00FF_FFFFu32.to_le_bytes());

        let result = parser(&dir.path().join("bad.zip"), &bytes)
            .central_directory()
            .await;
        assert!(result.is_err());
    }
}
