//! Adding, deleting and rearranging entries.
//!
//! None of these write to the archive; they change the in-memory model and
//! leave the work to the next update.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use walkdir::WalkDir;

use super::ZFile;
use crate::bytes::ByteSource;
use crate::checksum::{Checksum, Crc32, Crc32Reader};
use crate::codec::{CompressionMethod, method};
use crate::compress::{CompressionFuture, CompressionResult};
use crate::entry::{Content, StoredEntry};
use crate::format::central::CentralDirectoryHeader;
use crate::format::eocd::Eocd;
use crate::format::extra::{ExtraField, alignment_padding};
use crate::format::local::DataDescriptorType;
use crate::format::names::EntryName;
use crate::format::{flags, version};
use crate::timestamp::DosDateTime;
use crate::{Error, Result};

impl ZFile {
    /// Adds an entry with the data read from `reader`, compressing it with
    /// the configured compressor.
    ///
    /// An existing entry with the same name is replaced.
    pub fn add<R: Read>(&mut self, name: &str, reader: R) -> Result<()> {
        self.add_with_compression(name, reader, true)
    }

    /// Adds an entry with the data read from `reader`.
    ///
    /// With `may_compress` false the data is always stored, which lets it be
    /// aligned. The data is buffered on the tracker; compression starts
    /// right away and may still be running when this returns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for invalid names and for
    /// directory entries with data, and [`Error::ResourceLimitExceeded`] if
    /// the tracker cannot hold the data.
    pub fn add_with_compression<R: Read>(
        &mut self,
        name: &str,
        reader: R,
        may_compress: bool,
    ) -> Result<()> {
        self.check_writable()?;
        let name = EntryName::new(name)?;
        let mut reader = Crc32Reader::new(reader);
        let raw = self.options.tracker.from_reader(&mut reader)?;
        let crc32 = reader.crc();
        self.add_source(name, raw, crc32, may_compress)
    }

    /// Adds an entry holding `data`, compressing it with the configured
    /// compressor.
    pub fn add_bytes(&mut self, name: &str, data: Vec<u8>) -> Result<()> {
        self.check_writable()?;
        let name = EntryName::new(name)?;
        let crc32 = Crc32::compute(&data);
        let raw = self.options.tracker.from_bytes(data)?;
        self.add_source(name, raw, crc32, true)
    }

    fn add_source(
        &mut self,
        name: EntryName,
        raw: ByteSource,
        crc32: u32,
        may_compress: bool,
    ) -> Result<()> {
        if name.is_directory() && raw.size() > 0 {
            return Err(Error::invalid_argument(format!(
                "directory entry '{}' cannot hold data",
                name
            )));
        }
        let future = if may_compress && raw.size() > 0 {
            self.options.compressor.compress(raw.clone(), &self.options.tracker)
        } else {
            CompressionFuture::ready(Ok(CompressionResult::from_source(
                CompressionMethod::Store,
                raw.clone(),
            )))
        };

        let header = CentralDirectoryHeader {
            version_made_by: version::MADE_BY,
            version_to_extract: version_for(method::STORE, name.is_directory()),
            flags: if name.needs_utf8_flag() { flags::UTF8 } else { 0 },
            method: method::STORE,
            last_modified: if self.options.no_timestamps {
                DosDateTime::ZERO
            } else {
                DosDateTime::now()
            },
            crc32,
            compressed_size: raw.size(),
            uncompressed_size: raw.size(),
            disk_number_start: 0,
            internal_attributes: 0,
            external_attributes: 0,
            local_header_offset: 0,
            name,
            extra: Vec::new(),
            comment: Vec::new(),
        };
        let entry = StoredEntry::new(
            header,
            ExtraField::default(),
            DataDescriptorType::None,
            (self.options.verify_log_factory)(),
            Content::Pending { raw, future },
        );
        log::debug!("added '{}' ({} bytes)", entry.name(), entry.uncompressed_size());
        self.insert_pending(entry);
        Ok(())
    }

    /// Deletes an entry. Its space becomes a gap at the next update.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EntryNotFound`] if there is no entry called `name`.
    pub fn delete(&mut self, name: &str) -> Result<()> {
        self.check_writable()?;
        self.remove_entry(name)
            .ok_or_else(|| StoredEntry::not_found(name))?;
        self.dirty = true;
        log::debug!("deleted '{}'", name);
        Ok(())
    }

    /// Copies every entry of `other` whose name `ignore` rejects into this
    /// archive, without recompressing.
    ///
    /// Entries already present here are replaced. Data descriptors and
    /// alignment padding are not copied; merged entries are aligned by the
    /// rules of this archive.
    pub fn merge_from(&mut self, other: &ZFile, ignore: impl Fn(&str) -> bool) -> Result<()> {
        self.check_writable()?;
        for entry in other.entries() {
            if ignore(entry.name()) {
                continue;
            }
            let info = entry.compression_info()?;
            let compressed = other.detached_source(entry)?;

            let mut header = entry.header.clone();
            header.method = info.method_code;
            header.compressed_size = info.compressed_size;
            header.local_header_offset = 0;
            header.version_to_extract = header
                .version_to_extract
                .max(version_for(info.method_code, entry.is_directory()));
            let mut merged = StoredEntry::new(
                header,
                entry.local_extra.without_alignment(),
                entry.data_descriptor,
                (self.options.verify_log_factory)(),
                Content::Staged { compressed },
            );
            merged.drop_data_descriptor();
            log::debug!("merged '{}'", merged.name());
            self.insert_pending(merged);
        }
        Ok(())
    }

    /// Adds a file, or a directory and everything below it.
    ///
    /// A file is added under its file name. The contents of a directory are
    /// added under their path relative to it, with `/` separators, in file
    /// name order; subdirectories get a directory entry. `may_compress` is
    /// asked about every file.
    pub fn add_all_recursively(
        &mut self,
        path: impl AsRef<Path>,
        may_compress: impl Fn(&Path) -> bool,
    ) -> Result<()> {
        let root = path.as_ref();
        if std::fs::metadata(root)?.is_file() {
            let name = root
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| non_utf8(root))?;
            return self.add_with_compression(name, File::open(root)?, may_compress(root));
        }

        for item in WalkDir::new(root).min_depth(1).sort_by_file_name() {
            let item = item.map_err(io::Error::from)?;
            let relative = item
                .path()
                .strip_prefix(root)
                .map_err(|_| non_utf8(item.path()))?;
            let parts = relative
                .components()
                .map(|c| c.as_os_str().to_str().ok_or_else(|| non_utf8(item.path())))
                .collect::<Result<Vec<_>>>()?;
            let name = parts.join("/");

            if item.file_type().is_dir() {
                self.add_with_compression(&format!("{}/", name), io::empty(), false)?;
            } else if item.file_type().is_file() {
                let file = File::open(item.path())?;
                self.add_with_compression(&name, file, may_compress(item.path()))?;
            }
        }
        Ok(())
    }

    /// Rewrites the archive at the next update with entries in name order
    /// and no gaps.
    pub fn sort_zip_contents(&mut self) -> Result<()> {
        self.check_writable()?;
        let names: Vec<String> = self.entries.keys().cloned().collect();
        for name in &names {
            self.stage(name)?;
        }
        self.pending = names;
        self.dirty = true;
        log::debug!("sorted {} entries", self.pending.len());
        Ok(())
    }

    /// Moves every written entry whose padding does not match its
    /// alignment, so the next update places it again.
    ///
    /// Returns `true` if any entry has to move.
    pub fn realign(&mut self) -> Result<bool> {
        self.check_writable()?;
        let misaligned: Vec<String> = self
            .entries
            .values()
            .filter(|entry| {
                let Some(offset) = entry.local_header_offset() else {
                    return false;
                };
                let expected = alignment_padding(
                    offset + entry.unpadded_header_size(),
                    self.alignment_of(entry),
                );
                expected != entry.alignment_padding()
            })
            .map(|entry| entry.name().to_string())
            .collect();

        for name in &misaligned {
            self.stage(name)?;
            log::debug!("realigning '{}'", name);
        }
        let moved = !misaligned.is_empty();
        self.pending.extend(misaligned);
        self.dirty |= moved;
        Ok(moved)
    }

    /// Marks the archive as changed so the next update rewrites the central
    /// directory.
    pub fn touch(&mut self) -> Result<()> {
        self.check_writable()?;
        self.dirty = true;
        Ok(())
    }

    /// Sets the number of bytes to leave between the last entry and the
    /// central directory.
    pub fn set_extra_directory_offset(&mut self, offset: u64) -> Result<()> {
        self.check_writable()?;
        if offset != self.extra_directory_offset {
            self.extra_directory_offset = offset;
            self.dirty = true;
        }
        Ok(())
    }

    /// Sets the archive comment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the comment is longer than
    /// 65535 bytes or contains an end of central directory signature.
    pub fn set_eocd_comment(&mut self, comment: Vec<u8>) -> Result<()> {
        self.check_writable()?;
        Eocd::validate_comment(&comment)?;
        if comment != self.eocd_comment {
            self.eocd_comment = comment;
            self.dirty = true;
        }
        Ok(())
    }

    fn insert_pending(&mut self, entry: StoredEntry) {
        let name = entry.name().to_string();
        self.remove_entry(&name);
        self.pending.push(name.clone());
        self.entries.insert(name, entry);
        self.dirty = true;
    }

    fn remove_entry(&mut self, name: &str) -> Option<StoredEntry> {
        let entry = self.entries.remove(name)?;
        if let Some(offset) = entry.local_header_offset() {
            self.map.remove(offset);
        }
        self.pending.retain(|n| n != name);
        Some(entry)
    }

    /// Takes a written entry out of its place, keeping its data in memory.
    pub(crate) fn stage(&mut self, name: &str) -> Result<()> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| StoredEntry::not_found(name))?;
        let Some(offset) = entry.local_header_offset() else {
            return Ok(());
        };
        let compressed = self.detached_source(entry)?;
        self.map.remove(offset);
        if let Some(entry) = self.entries.get_mut(name) {
            entry.content = Content::Staged { compressed };
            entry.drop_data_descriptor();
            entry.local_extra = entry.local_extra.without_alignment();
        }
        Ok(())
    }
}

/// "Version needed to extract" for an entry written with `method_code`.
pub(crate) fn version_for(method_code: u16, directory: bool) -> u16 {
    if method_code == method::DEFLATE || directory {
        version::DEFLATE_OR_DIRECTORY
    } else {
        version::DEFAULT
    }
}

fn non_utf8(path: &Path) -> Error {
    Error::invalid_argument(format!("{} is not a valid entry name", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ZFileOptions;
    use crate::compress::StoreCompressor;
    use crate::storage::MemoryStorage;
    use std::sync::Arc;

    fn memory_zfile() -> ZFile {
        ZFile::open_storage(MemoryStorage::new(), ZFileOptions::new()).unwrap()
    }

    #[test]
    fn test_version_for() {
        assert_eq!(version_for(method::STORE, false), version::DEFAULT);
        assert_eq!(version_for(method::DEFLATE, false), version::DEFLATE_OR_DIRECTORY);
        assert_eq!(version_for(method::STORE, true), version::DEFLATE_OR_DIRECTORY);
    }

    #[test]
    fn test_add_replaces_pending() {
        let mut zf = memory_zfile();
        zf.add_bytes("a", b"one".to_vec()).unwrap();
        zf.add_bytes("a", b"two".to_vec()).unwrap();
        assert_eq!(zf.pending, vec!["a".to_string()]);
        assert_eq!(zf.read("a").unwrap(), b"two");
        assert_eq!(zf.options.tracker.bytes_used(), 3);
    }

    #[test]
    fn test_directory_with_data_is_rejected() {
        let mut zf = memory_zfile();
        let err = zf.add_bytes("dir/", b"x".to_vec()).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        zf.add_bytes("dir/", Vec::new()).unwrap();
        assert!(zf.get("dir/").unwrap().is_directory());
    }

    #[test]
    fn test_delete_missing_entry() {
        let mut zf = memory_zfile();
        let err = zf.delete("nope").unwrap_err();
        assert_eq!(err.entry_name(), Some("nope"));
    }

    #[test]
    fn test_pending_header() {
        let options = ZFileOptions::new()
            .no_timestamps(true)
            .compressor(Arc::new(StoreCompressor));
        let mut zf = ZFile::open_storage(MemoryStorage::new(), options).unwrap();
        zf.add_bytes("naïve.txt", b"abc".to_vec()).unwrap();

        let entry = zf.get("naïve.txt").unwrap();
        let header = entry.central_directory_header();
        assert_eq!(header.flags & flags::UTF8, flags::UTF8);
        assert_eq!(header.last_modified, DosDateTime::ZERO);
        assert_eq!(header.crc32, Crc32::compute(b"abc"));
        assert!(entry.is_pending());
    }

    #[test]
    fn test_eocd_comment_validation() {
        let mut zf = memory_zfile();
        zf.set_eocd_comment(b"built".to_vec()).unwrap();
        assert_eq!(zf.eocd_comment(), b"built");

        let mut nested = b"PK\x05\x06".to_vec();
        nested.resize(22, 0);
        assert!(zf.set_eocd_comment(nested).is_err());
        assert_eq!(zf.eocd_comment(), b"built");
    }
}
