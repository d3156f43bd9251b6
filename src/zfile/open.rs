//! Opening archives and checking them against their central directory.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::{ZFile, ZFileState};
use crate::entry::{Content, StoredEntry};
use crate::format::central::CentralDirectoryHeader;
use crate::format::eocd::{Eocd, MAX_EOCD_SEARCH};
use crate::format::extra::ExtraField;
use crate::format::local::{DataDescriptor, DataDescriptorType, LocalHeader};
use crate::format::reader::u16_at;
use crate::format::{LOCAL_HEADER_SIZE, version};
use crate::layout::{BlockOwner, FileUseMap};
use crate::options::ZFileOptions;
use crate::storage::{self, FileStorage, SharedStorage, Storage};
use crate::verify::{self, VerifyLog};
use crate::{Error, Result};

impl ZFile {
    /// Opens the archive at `path` with default options.
    ///
    /// A missing or empty file starts an empty archive; the file is created
    /// by the first update. A file that cannot be written is opened
    /// read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_options(path, ZFileOptions::new())
    }

    /// Opens the archive at `path`.
    pub fn open_with_options(path: impl AsRef<Path>, options: ZFileOptions) -> Result<Self> {
        Self::open_storage(FileStorage::open(path)?, options)
    }

    /// Opens an archive kept in `storage`.
    ///
    /// # Errors
    ///
    /// Returns a format error if the storage is not empty and does not hold
    /// a zip archive, or if entries overlap each other, overlap the central
    /// directory or extend past the end of the file.
    pub fn open_storage(storage: impl Storage + 'static, options: ZFileOptions) -> Result<Self> {
        let read_only = storage.is_read_only();
        let storage: SharedStorage = Arc::new(Mutex::new(Box::new(storage)));
        let file_size = storage::lock(&storage)?.len()?;

        let mut zf = ZFile {
            storage,
            read_only,
            verify_log: (options.verify_log_factory)(),
            options,
            entries: BTreeMap::new(),
            pending: Vec::new(),
            map: FileUseMap::new(file_size),
            directory_offset: 0,
            directory_bytes: Vec::new(),
            eocd_offset: 0,
            eocd_bytes: Vec::new(),
            eocd_comment: Vec::new(),
            extra_directory_offset: 0,
            extensions: Vec::new(),
            dirty: file_size == 0 && !read_only,
            state: ZFileState::Open,
        };
        if file_size > 0 {
            zf.read_archive(file_size)?;
        }
        log::debug!(
            "opened archive with {} entries ({} bytes{})",
            zf.entries.len(),
            file_size,
            if read_only { ", read-only" } else { "" }
        );
        Ok(zf)
    }

    fn read_archive(&mut self, file_size: u64) -> Result<()> {
        let tail_len = file_size.min(MAX_EOCD_SEARCH as u64);
        let tail_offset = file_size - tail_len;
        let tail = self.read_range(tail_offset, tail_len)?;
        let (eocd_offset, eocd) = Eocd::find(&tail, tail_offset)?;

        let directory_offset = u64::from(eocd.directory_offset);
        let directory_size = u64::from(eocd.directory_size);
        if directory_offset + directory_size > eocd_offset {
            return Err(Error::InvalidFormat(format!(
                "central directory [{}, {}) runs into the end of central directory at {}",
                directory_offset,
                directory_offset + directory_size,
                eocd_offset
            )));
        }

        self.map
            .add(eocd_offset, file_size, BlockOwner::Eocd)
            .map_err(|owner| overlap("End of Central Directory", &owner))?;
        self.map
            .add(
                directory_offset,
                directory_offset + directory_size,
                BlockOwner::CentralDirectory,
            )
            .map_err(|owner| overlap("Central Directory", &owner))?;

        let directory = self.read_range(directory_offset, directory_size)?;
        let mut cursor = Cursor::new(directory.as_slice());
        let mut headers = Vec::with_capacity(usize::from(eocd.total_records));
        for _ in 0..eocd.total_records {
            let position = directory_offset + cursor.position();
            headers.push(CentralDirectoryHeader::parse(&mut cursor, position)?);
        }
        if cursor.position() != directory_size {
            return Err(Error::InvalidFormat(format!(
                "central directory has {} records in {} bytes but {} bytes are declared",
                eocd.total_records,
                cursor.position(),
                directory_size
            )));
        }

        headers.sort_by_key(|h| h.local_header_offset);
        let mut entries_end = 0;
        for header in headers {
            let entry = self.read_entry(header, file_size)?;
            let name = entry.name().to_string();
            let start = entry.central_directory_header().local_header_offset;
            let end = start + entry.on_disk_size();
            self.map
                .add(start, end, BlockOwner::Entry(name.clone()))
                .map_err(|owner| overlap(&name, &owner))?;
            entries_end = entries_end.max(end);
            if self.entries.insert(name.clone(), entry).is_some() {
                return Err(Error::InvalidFormat(format!(
                    "entry '{}' appears twice in the central directory",
                    name
                )));
            }
        }

        self.extra_directory_offset = directory_offset.saturating_sub(entries_end);
        self.directory_offset = directory_offset;
        self.directory_bytes = directory;
        self.eocd_offset = eocd_offset;
        self.eocd_bytes = tail[(eocd_offset - tail_offset) as usize..].to_vec();
        self.eocd_comment = eocd.comment;
        Ok(())
    }

    fn read_entry(
        &mut self,
        header: CentralDirectoryHeader,
        file_size: u64,
    ) -> Result<StoredEntry> {
        let name = header.name.as_str().to_string();
        let offset = header.local_header_offset;
        let outside = |end: u64| Error::EntryOutsideFile {
            entry_name: name.clone(),
            end,
            file_size,
        };

        let fixed_end = offset + LOCAL_HEADER_SIZE as u64;
        if fixed_end > file_size {
            return Err(outside(fixed_end));
        }
        let fixed = self.read_range(offset, LOCAL_HEADER_SIZE as u64)?;
        let name_len = u64::from(u16_at(&fixed, 26).unwrap_or(0));
        let extra_len = u64::from(u16_at(&fixed, 28).unwrap_or(0));
        let header_size = LOCAL_HEADER_SIZE as u64 + name_len + extra_len;
        if offset + header_size > file_size {
            return Err(outside(offset + header_size));
        }
        let raw = self.read_range(offset, header_size)?;
        let local = LocalHeader::parse(&mut raw.as_slice(), offset)?;

        let data_end = offset + header_size + header.compressed_size;
        if data_end > file_size {
            return Err(outside(data_end));
        }

        let mut log = (self.options.verify_log_factory)();
        let validate = !self.options.skip_validation;
        let data_descriptor = if header.uses_data_descriptor() {
            let available = (file_size - data_end).min(16);
            if available < DataDescriptorType::WithoutSignature.size() {
                return Err(outside(data_end + DataDescriptorType::WithoutSignature.size()));
            }
            let bytes = self.read_range(data_end, available)?;
            let descriptor = DataDescriptor::parse(&bytes, data_end)?;
            if validate {
                check_descriptor(&header, &descriptor, log.as_mut());
            }
            descriptor.kind
        } else {
            DataDescriptorType::None
        };

        if validate {
            check_local(&header, &local, log.as_mut());
            if header.version_to_extract & 0xff > version::MAX_SUPPORTED {
                verify::record(
                    self.verify_log.as_mut(),
                    format!(
                        "entry '{}' needs version {} to extract but only {} is supported",
                        name,
                        header.version_to_extract,
                        version::MAX_SUPPORTED
                    ),
                );
            }
        }

        Ok(StoredEntry::new(
            header,
            ExtraField::parse(&local.extra),
            data_descriptor,
            log,
            Content::OnDisk { header_size },
        ))
    }
}

fn overlap(first: &str, owner: &BlockOwner) -> Error {
    Error::OverlappingEntries {
        first: first.to_string(),
        second: owner.to_string(),
    }
}

fn check_local(central: &CentralDirectoryHeader, local: &LocalHeader, log: &mut dyn VerifyLog) {
    let name = central.name.as_str();
    if local.version_to_extract != central.version_to_extract {
        verify::record(
            log,
            format!(
                "version to extract of '{}' is {} in the local header and {} in the central directory",
                name, local.version_to_extract, central.version_to_extract
            ),
        );
    }
    if local.name != central.name.raw() {
        verify::record(
            log,
            format!(
                "local header of '{}' names '{}'",
                name,
                String::from_utf8_lossy(&local.name)
            ),
        );
    }
    if local.method != central.method {
        verify::record(
            log,
            format!(
                "compression method of '{}' is {} in the local header and {} in the central directory",
                name, local.method, central.method
            ),
        );
    }
    if central.uses_data_descriptor() {
        return;
    }
    if local.crc32 != central.crc32 {
        verify::record(
            log,
            format!(
                "CRC32 of '{}' is {:#010x} in the local header and {:#010x} in the central directory",
                name, local.crc32, central.crc32
            ),
        );
    }
    if u64::from(local.compressed_size) != central.compressed_size
        || u64::from(local.uncompressed_size) != central.uncompressed_size
    {
        verify::record(
            log,
            format!(
                "sizes of '{}' are {}/{} in the local header and {}/{} in the central directory",
                name,
                local.compressed_size,
                local.uncompressed_size,
                central.compressed_size,
                central.uncompressed_size
            ),
        );
    }
}

fn check_descriptor(
    central: &CentralDirectoryHeader,
    descriptor: &DataDescriptor,
    log: &mut dyn VerifyLog,
) {
    let name = central.name.as_str();
    if descriptor.crc32 != central.crc32 {
        verify::record(
            log,
            format!(
                "CRC32 of '{}' is {:#010x} in the data descriptor and {:#010x} in the central directory",
                name, descriptor.crc32, central.crc32
            ),
        );
    }
    if u64::from(descriptor.compressed_size) != central.compressed_size
        || u64::from(descriptor.uncompressed_size) != central.uncompressed_size
    {
        verify::record(
            log,
            format!(
                "sizes of '{}' are {}/{} in the data descriptor and {}/{} in the central directory",
                name,
                descriptor.compressed_size,
                descriptor.uncompressed_size,
                central.compressed_size,
                central.uncompressed_size
            ),
        );
    }
}
