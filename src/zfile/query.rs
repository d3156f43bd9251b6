//! Read access to entries and archive records.

use std::sync::Arc;

use super::ZFile;
use crate::bytes::ByteSource;
use crate::checksum::{Checksum, Crc32};
use crate::codec;
use crate::entry::{CompressionInfo, Content, StoredEntry};
use crate::layout::NO_ALIGNMENT;
use crate::options::ZFileOptions;
use crate::storage;
use crate::verify::VerifyLog;
use crate::{Error, Result};

impl ZFile {
    /// Iterates over the entries in name order, pending entries included.
    pub fn entries(&self) -> impl Iterator<Item = &StoredEntry> {
        self.entries.values()
    }

    /// Returns the entry called `name`.
    pub fn get(&self, name: &str) -> Option<&StoredEntry> {
        self.entries.get(name)
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the archive has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reads and decodes the data of an entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EntryNotFound`] for unknown names,
    /// [`Error::UnsupportedMethod`] if the data cannot be decoded and
    /// [`Error::CrcMismatch`] if the decoded data does not match its CRC.
    pub fn read(&self, name: &str) -> Result<Vec<u8>> {
        let entry = self.entries.get(name).ok_or_else(|| StoredEntry::not_found(name))?;
        if let Content::Pending { raw, .. } = &entry.content {
            return raw.read();
        }

        let compressed = self.compressed_source(entry)?;
        let header = &entry.header;
        let data = codec::decode(
            compressed.open()?,
            header.method,
            header.uncompressed_size,
            name,
        )?;
        if data.len() as u64 != header.uncompressed_size {
            return Err(Error::InvalidFormat(format!(
                "entry '{}' decodes to {} bytes but declares {}",
                name,
                data.len(),
                header.uncompressed_size
            )));
        }
        let actual = Crc32::compute(&data);
        if actual != header.crc32 {
            return Err(Error::CrcMismatch {
                entry_name: name.to_string(),
                expected: header.crc32,
                actual,
            });
        }
        Ok(data)
    }

    /// Returns the method and sizes of an entry, waiting for its
    /// compression if it is still running.
    pub fn compression_info(&self, name: &str) -> Result<CompressionInfo> {
        self.entries
            .get(name)
            .ok_or_else(|| StoredEntry::not_found(name))?
            .compression_info()
    }

    /// Returns the offset of the central directory as of the last update,
    /// or as read when the archive was opened.
    pub fn central_directory_offset(&self) -> u64 {
        self.directory_offset
    }

    /// Returns the size of the central directory.
    pub fn central_directory_size(&self) -> u64 {
        self.directory_bytes.len() as u64
    }

    /// Returns the encoded central directory.
    pub fn central_directory_bytes(&self) -> &[u8] {
        &self.directory_bytes
    }

    /// Returns the offset of the end of central directory record.
    pub fn eocd_offset(&self) -> u64 {
        self.eocd_offset
    }

    /// Returns the size of the end of central directory record.
    pub fn eocd_size(&self) -> u64 {
        self.eocd_bytes.len() as u64
    }

    /// Returns the encoded end of central directory record.
    pub fn eocd_bytes(&self) -> &[u8] {
        &self.eocd_bytes
    }

    /// Returns the archive comment.
    pub fn eocd_comment(&self) -> &[u8] {
        &self.eocd_comment
    }

    /// Returns the number of bytes left between the last entry and the
    /// central directory.
    pub fn extra_directory_offset(&self) -> u64 {
        self.extra_directory_offset
    }

    /// Returns the messages recorded about the archive as a whole.
    pub fn verify_log(&self) -> &dyn VerifyLog {
        self.verify_log.as_ref()
    }

    /// Returns the options the archive was opened with.
    pub fn options(&self) -> &ZFileOptions {
        &self.options
    }

    /// Returns `true` if the archive cannot be modified.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub(crate) fn read_range(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        let len = usize::try_from(len).map_err(|_| {
            Error::ResourceLimitExceeded(format!("{} bytes do not fit in memory", len))
        })?;
        let mut buf = vec![0u8; len];
        storage::lock(&self.storage)?.read_at(offset, &mut buf)?;
        Ok(buf)
    }

    pub(crate) fn write_at(&self, offset: u64, data: &[u8]) -> Result<()> {
        storage::lock(&self.storage)?.write_at(offset, data)?;
        Ok(())
    }

    pub(crate) fn zero_range(&self, start: u64, end: u64) -> Result<()> {
        let zeros = [0u8; crate::READ_BUFFER_SIZE];
        let mut storage = storage::lock(&self.storage)?;
        let mut offset = start;
        while offset < end {
            let n = (end - offset).min(zeros.len() as u64) as usize;
            storage.write_at(offset, &zeros[..n])?;
            offset += n as u64;
        }
        Ok(())
    }

    /// Returns the data of an entry as stored, compressed or not.
    ///
    /// Data on disk is returned as a range of the archive, which is only
    /// valid until the archive is next written.
    pub(crate) fn compressed_source(&self, entry: &StoredEntry) -> Result<ByteSource> {
        match &entry.content {
            Content::OnDisk { header_size } => Ok(ByteSource::from_range(
                Arc::clone(&self.storage),
                entry.header.local_header_offset + header_size,
                entry.header.compressed_size,
            )),
            Content::Pending { future, .. } => Ok(future.wait()?.into_source()),
            Content::Staged { compressed } => Ok(compressed.clone()),
        }
    }

    /// Like [`compressed_source`](Self::compressed_source), but data on disk
    /// is copied into tracked memory so it outlives later writes.
    pub(crate) fn detached_source(&self, entry: &StoredEntry) -> Result<ByteSource> {
        let source = self.compressed_source(entry)?;
        match entry.content {
            Content::OnDisk { .. } => self.options.tracker.from_reader(source.open()?),
            _ => Ok(source),
        }
    }

    /// Alignment the data of `entry` must have. Compressed data is never
    /// aligned.
    pub(crate) fn alignment_of(&self, entry: &StoredEntry) -> u64 {
        if entry.is_stored() {
            u64::from(self.options.alignment_rule.alignment(entry.name()))
        } else {
            u64::from(NO_ALIGNMENT)
        }
    }
}
