//! Entries of an archive.

use std::fmt;

use crate::bytes::ByteSource;
use crate::codec::{CompressionMethod, method};
use crate::compress::CompressionFuture;
use crate::format::LOCAL_HEADER_SIZE;
use crate::format::central::{CentralDirectoryHeader, to_u32};
use crate::format::extra::{ALIGNMENT_SEGMENT_ID, ExtraField, ExtraSegment};
use crate::format::flags;
use crate::format::local::{DataDescriptorType, LocalHeader};
use crate::timestamp::DosDateTime;
use crate::verify::VerifyLog;
use crate::{Error, Result};

/// Whether an entry is a file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryType {
    /// A regular file.
    File,
    /// A directory; its name ends with `/` and it holds no data.
    Directory,
}

/// Method, sizes and CRC of an entry once its compression is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionInfo {
    /// Zip method code.
    pub method_code: u16,
    /// Size of the data as stored.
    pub compressed_size: u64,
    /// Size of the data once decoded.
    pub uncompressed_size: u64,
    /// CRC-32 of the decoded data.
    pub crc32: u32,
}

impl CompressionInfo {
    /// Returns the method, or `None` for methods this crate cannot decode.
    pub fn method(&self) -> Option<CompressionMethod> {
        CompressionMethod::from_code(self.method_code)
    }
}

/// Where the data of an entry currently is.
pub(crate) enum Content {
    /// In the archive, `header_size` bytes after the local header offset.
    OnDisk { header_size: u64 },
    /// Added but not written. `raw` holds the uncompressed bytes.
    Pending {
        raw: ByteSource,
        future: CompressionFuture,
    },
    /// Already compressed and waiting to be written, for entries merged
    /// from another archive or moved out of their place.
    Staged { compressed: ByteSource },
}

/// An entry of a [`ZFile`](crate::ZFile).
///
/// The central directory header of a pending entry carries its CRC and
/// uncompressed size from the moment it is added. The method and
/// compressed size are only final once [`compression_info`] returns, and the
/// local header offset only once the entry has been written by an update.
///
/// [`compression_info`]: crate::ZFile::compression_info
pub struct StoredEntry {
    pub(crate) header: CentralDirectoryHeader,
    pub(crate) local_extra: ExtraField,
    pub(crate) data_descriptor: DataDescriptorType,
    pub(crate) verify_log: Box<dyn VerifyLog>,
    pub(crate) content: Content,
}

impl StoredEntry {
    pub(crate) fn new(
        header: CentralDirectoryHeader,
        local_extra: ExtraField,
        data_descriptor: DataDescriptorType,
        verify_log: Box<dyn VerifyLog>,
        content: Content,
    ) -> Self {
        Self {
            header,
            local_extra,
            data_descriptor,
            verify_log,
            content,
        }
    }

    /// Returns the entry name.
    pub fn name(&self) -> &str {
        self.header.name.as_str()
    }

    /// Returns whether the entry is a file or a directory.
    pub fn entry_type(&self) -> EntryType {
        if self.header.name.is_directory() {
            EntryType::Directory
        } else {
            EntryType::File
        }
    }

    /// Returns `true` for directory entries.
    pub fn is_directory(&self) -> bool {
        self.entry_type() == EntryType::Directory
    }

    /// Returns the central directory header.
    pub fn central_directory_header(&self) -> &CentralDirectoryHeader {
        &self.header
    }

    /// Returns the extra field of the local header.
    pub fn local_extra(&self) -> &ExtraField {
        &self.local_extra
    }

    /// Returns how the data descriptor of the entry is stored.
    ///
    /// Entries written by this crate never have one.
    pub fn data_descriptor_type(&self) -> DataDescriptorType {
        self.data_descriptor
    }

    /// Returns the messages recorded while checking this entry.
    pub fn verify_log(&self) -> &dyn VerifyLog {
        self.verify_log.as_ref()
    }

    /// Returns the offset of the local header, or `None` if the entry has
    /// not been written yet.
    pub fn local_header_offset(&self) -> Option<u64> {
        match self.content {
            Content::OnDisk { .. } => Some(self.header.local_header_offset),
            _ => None,
        }
    }

    /// Returns the offset of the entry data, or `None` if the entry has not
    /// been written yet.
    pub fn data_offset(&self) -> Option<u64> {
        match self.content {
            Content::OnDisk { header_size } => Some(self.header.local_header_offset + header_size),
            _ => None,
        }
    }

    /// Returns the CRC-32 of the uncompressed data.
    pub fn crc32(&self) -> u32 {
        self.header.crc32
    }

    /// Returns the size of the uncompressed data.
    pub fn uncompressed_size(&self) -> u64 {
        self.header.uncompressed_size
    }

    /// Returns the modification time.
    pub fn last_modified(&self) -> DosDateTime {
        self.header.last_modified
    }

    /// Returns `true` until the entry has been written by an update.
    pub fn is_pending(&self) -> bool {
        !matches!(self.content, Content::OnDisk { .. })
    }

    /// Returns the method and sizes, waiting for compression if needed.
    pub fn compression_info(&self) -> Result<CompressionInfo> {
        let (method_code, compressed_size) = match &self.content {
            Content::Pending { future, .. } => {
                let result = future.wait()?;
                (result.method().code(), result.size())
            }
            _ => (self.header.method, self.header.compressed_size),
        };
        Ok(CompressionInfo {
            method_code,
            compressed_size,
            uncompressed_size: self.header.uncompressed_size,
            crc32: self.header.crc32,
        })
    }

    /// Size of the local header with the current local extra field.
    pub(crate) fn local_header_size(&self) -> u64 {
        (LOCAL_HEADER_SIZE + self.header.name.raw().len() + self.local_extra.size()) as u64
    }

    /// Size of the local header without alignment padding.
    pub(crate) fn unpadded_header_size(&self) -> u64 {
        let extra = self.local_extra.without_alignment();
        (LOCAL_HEADER_SIZE + self.header.name.raw().len() + extra.size()) as u64
    }

    /// Total bytes the entry takes in the archive.
    pub(crate) fn on_disk_size(&self) -> u64 {
        let header_size = match self.content {
            Content::OnDisk { header_size } => header_size,
            _ => self.local_header_size(),
        };
        header_size + self.header.compressed_size + self.data_descriptor.size()
    }

    /// Bytes of alignment padding in the local extra field.
    pub(crate) fn alignment_padding(&self) -> usize {
        self.local_extra
            .segments()
            .into_iter()
            .flatten()
            .filter(|s| s.id() == ALIGNMENT_SEGMENT_ID)
            .map(ExtraSegment::size)
            .sum()
    }

    /// Marks the entry as rewritten without a data descriptor.
    pub(crate) fn drop_data_descriptor(&mut self) {
        self.data_descriptor = DataDescriptorType::None;
        self.header.flags &= !flags::DATA_DESCRIPTOR;
    }

    /// Builds the local header matching the central directory header.
    pub(crate) fn local_header(&self) -> Result<LocalHeader> {
        Ok(LocalHeader {
            version_to_extract: self.header.version_to_extract,
            flags: self.header.flags & !flags::DATA_DESCRIPTOR,
            method: self.header.method,
            last_modified: self.header.last_modified,
            crc32: self.header.crc32,
            compressed_size: to_u32(self.header.compressed_size)?,
            uncompressed_size: to_u32(self.header.uncompressed_size)?,
            name: self.header.name.raw().to_vec(),
            extra: self.local_extra.encode(),
        })
    }

    /// Returns `true` if the stored data is not compressed.
    pub(crate) fn is_stored(&self) -> bool {
        self.header.method == method::STORE
    }

    pub(crate) fn not_found(name: &str) -> Error {
        Error::EntryNotFound {
            name: name.to_string(),
        }
    }
}

impl fmt::Debug for StoredEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let content = match &self.content {
            Content::OnDisk { .. } => "on disk",
            Content::Pending { .. } => "pending",
            Content::Staged { .. } => "staged",
        };
        f.debug_struct("StoredEntry")
            .field("name", &self.header.name)
            .field("method", &method::name(self.header.method))
            .field("local_header_offset", &self.local_header_offset())
            .field("compressed_size", &self.header.compressed_size)
            .field("uncompressed_size", &self.header.uncompressed_size)
            .field("content", &content)
            .finish()
    }
}
