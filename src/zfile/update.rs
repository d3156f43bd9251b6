//! The flush protocol.

use super::mutate::version_for;
use super::{ZFile, ZFileState};
use crate::bytes::ByteSource;
use crate::codec::method;
use crate::entry::{Content, StoredEntry};
use crate::format::LOCAL_HEADER_SIZE;
use crate::format::central::to_u32;
use crate::format::eocd::Eocd;
use crate::format::extra::{ExtraField, MIN_ALIGNMENT_SEGMENT_SIZE, alignment_padding};
use crate::format::local::DataDescriptorType;
use crate::layout::{BlockOwner, NO_ALIGNMENT};
use crate::storage;
use crate::timestamp::DosDateTime;
use crate::{Error, Result};

/// Largest local extra field cover mode grows an entry to.
const MAX_COVER_EXTRA_SIZE: usize = 0x7fff;

/// Offset of the time and date fields in a local header.
const LOCAL_TIME_OFFSET: u64 = 10;

impl ZFile {
    /// Writes all pending changes to the archive.
    ///
    /// Does nothing if nothing changed since the last update.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] after [`close`](Self::close),
    /// [`Error::ReadOnly`] for read-only archives with changes, and any error
    /// of a compression or a write. After a failed update the archive stays
    /// dirty and the update can be retried.
    pub fn update(&mut self) -> Result<()> {
        match self.state {
            ZFileState::Closed => return Err(Error::Closed),
            ZFileState::Flushing => return Ok(()),
            _ => {}
        }
        if !self.dirty {
            return Ok(());
        }
        if self.read_only {
            return Err(Error::ReadOnly);
        }

        self.notify(|extension, zfile| extension.before_update(zfile))?;

        self.state = ZFileState::Flushing;
        let result = self.flush();
        self.state = ZFileState::Open;
        result?;

        self.dirty = false;
        log::debug!(
            "updated archive: {} entries, central directory at {}",
            self.entries.len(),
            self.directory_offset
        );
        self.notify(|extension, zfile| extension.updated(zfile))
    }

    fn flush(&mut self) -> Result<()> {
        if self.options.auto_sort_files && self.needs_sort() {
            self.sort_zip_contents()?;
        }
        self.resolve_pending()?;

        if self.options.no_timestamps {
            self.clear_timestamps()?;
        }
        // The previous directory stays reserved until every entry is written,
        // so a failed write leaves it readable.
        self.write_pending()?;
        self.map.remove_owner(&BlockOwner::CentralDirectory);
        self.map.remove_owner(&BlockOwner::Eocd);

        if self.options.cover_empty_space_using_extra_field {
            self.cover_gaps()?;
        }
        for (start, end) in self.map.gaps() {
            self.zero_range(start, end)?;
        }
        self.write_directory()
    }

    /// Sorting is needed unless every entry is written and the entries are
    /// laid out in name order.
    fn needs_sort(&self) -> bool {
        if !self.pending.is_empty() {
            return true;
        }
        let mut written: Vec<&StoredEntry> = self.entries.values().collect();
        written.sort_by_key(|e| e.header.local_header_offset);
        written.windows(2).any(|pair| pair[0].name() > pair[1].name())
    }

    fn clear_timestamps(&mut self) -> Result<()> {
        let mut cleared = Vec::new();
        for entry in self.entries.values_mut() {
            if entry.header.last_modified == DosDateTime::ZERO {
                continue;
            }
            entry.header.last_modified = DosDateTime::ZERO;
            if let Some(offset) = entry.local_header_offset() {
                cleared.push(offset);
            }
        }
        for offset in cleared {
            self.write_at(offset + LOCAL_TIME_OFFSET, &[0u8; 4])?;
        }
        Ok(())
    }

    /// Waits for every pending compression.
    fn resolve_pending(&mut self) -> Result<()> {
        for name in &self.pending {
            if let Some(entry) = self.entries.get_mut(name) {
                resolve(entry)?;
            }
        }
        Ok(())
    }

    fn write_pending(&mut self) -> Result<()> {
        let pending = std::mem::take(&mut self.pending);
        for (i, name) in pending.iter().enumerate() {
            if let Err(e) = self.write_entry(name) {
                self.pending = pending[i..].to_vec();
                return Err(e);
            }
        }
        Ok(())
    }

    fn write_entry(&mut self, name: &str) -> Result<()> {
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| StoredEntry::not_found(name))?;
        resolve(entry)?;
        let compressed = match &entry.content {
            Content::Staged { compressed } => compressed.clone(),
            _ => return Ok(()),
        };
        let method_code = entry.header.method;

        let alignment = match entry.local_extra {
            ExtraField::Segments(_) if method_code == method::STORE => {
                self.options.alignment_rule.alignment(name)
            }
            _ => NO_ALIGNMENT,
        };
        let base_extra = entry.local_extra.without_alignment();
        let header_size =
            (LOCAL_HEADER_SIZE + entry.header.name.raw().len() + base_extra.size()) as u64;
        let placement = self.map.locate_free(
            header_size + compressed.size(),
            header_size,
            u64::from(alignment),
        );

        entry.local_extra = base_extra.with_alignment_padding(alignment as u16, placement.padding)?;
        entry.header.local_header_offset = placement.offset;
        entry.drop_data_descriptor();
        let header = entry.local_header()?.encode();

        let header_size = header.len() as u64;
        let end = placement.offset + header_size + compressed.size();
        self.map
            .add(placement.offset, end, BlockOwner::Entry(name.to_string()))
            .map_err(|owner| Error::OverlappingEntries {
                first: name.to_string(),
                second: owner.to_string(),
            })?;
        let written = self.write_at(placement.offset, &header).and_then(|()| {
            compressed.with_bytes(|data| self.write_at(placement.offset + header_size, data))
        });
        if let Err(e) = written {
            self.map.remove(placement.offset);
            return Err(e);
        }

        if let Some(entry) = self.entries.get_mut(name) {
            entry.content = Content::OnDisk { header_size };
        }
        log::debug!(
            "wrote '{}' at {} ({} bytes, {})",
            name,
            placement.offset,
            compressed.size(),
            method::name(method_code)
        );
        Ok(())
    }

    /// Absorbs every gap into a neighbouring entry where possible.
    fn cover_gaps(&mut self) -> Result<()> {
        let mut cursor = 0;
        while let Some((start, end)) = self.map.gaps().into_iter().find(|&(s, _)| s >= cursor) {
            if self.grow_previous(start, end)? || self.move_next_back(start, end)? {
                cursor = start + 1;
            } else {
                log::trace!("gap [{}, {}) cannot be covered", start, end);
                cursor = end;
            }
        }
        Ok(())
    }

    /// Grows the extra field of the entry ending at `start` so its data ends
    /// at `end`.
    fn grow_previous(&mut self, start: u64, end: u64) -> Result<bool> {
        let Some(previous) = start.checked_sub(1).and_then(|o| self.map.block_at(o)) else {
            return Ok(false);
        };
        let BlockOwner::Entry(name) = &previous.owner else {
            return Ok(false);
        };
        let (name, entry_start) = (name.clone(), previous.start);
        let Some(entry) = self.entries.get(&name) else {
            return Ok(false);
        };
        if entry.data_descriptor != DataDescriptorType::None
            || !matches!(entry.local_extra, ExtraField::Segments(_))
        {
            return Ok(false);
        }

        let gap = end - start;
        let alignment = self.alignment_of(entry).max(1);
        let padding = entry.alignment_padding() + gap as usize;
        if gap % alignment != 0 || padding < MIN_ALIGNMENT_SEGMENT_SIZE {
            return Ok(false);
        }
        let Some(extra) = entry
            .local_extra
            .with_alignment_padding(alignment as u16, padding)
            .ok()
            .filter(|extra| extra.size() <= MAX_COVER_EXTRA_SIZE)
        else {
            return Ok(false);
        };

        let data = self.compressed_source(entry)?;
        self.rewrite_entry(&name, entry_start, extra, data)?;
        log::trace!("covered gap [{}, {}) with the extra field of '{}'", start, end, name);
        Ok(true)
    }

    /// Moves the entry starting at `end` back to `start`.
    fn move_next_back(&mut self, start: u64, end: u64) -> Result<bool> {
        let Some(next) = self.map.block_at(end) else {
            return Ok(false);
        };
        let BlockOwner::Entry(name) = &next.owner else {
            return Ok(false);
        };
        let (name, next_end) = (name.clone(), next.end);
        let Some(entry) = self.entries.get(&name) else {
            return Ok(false);
        };

        let alignment = match entry.local_extra {
            ExtraField::Segments(_) => self.alignment_of(entry),
            ExtraField::Opaque(_) => u64::from(NO_ALIGNMENT),
        };
        let unpadded = entry.unpadded_header_size();
        let padding = alignment_padding(start + unpadded, alignment);
        if start + unpadded + padding as u64 + entry.header.compressed_size > next_end {
            return Ok(false);
        }
        let Ok(extra) = entry
            .local_extra
            .with_alignment_padding(alignment as u16, padding)
        else {
            return Ok(false);
        };

        let data = self.compressed_source(entry)?;
        self.rewrite_entry(&name, start, extra, data)?;
        log::trace!("moved '{}' from {} back to {}", name, end, start);
        Ok(true)
    }

    /// Writes an entry at `offset` with a new local extra field, replacing
    /// its previous block.
    fn rewrite_entry(
        &mut self,
        name: &str,
        offset: u64,
        extra: ExtraField,
        data: ByteSource,
    ) -> Result<()> {
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| StoredEntry::not_found(name))?;
        let old_offset = entry.header.local_header_offset;
        entry.local_extra = extra;
        entry.header.local_header_offset = offset;
        entry.drop_data_descriptor();
        let header = entry.local_header()?.encode();
        let header_size = header.len() as u64;
        entry.content = Content::OnDisk { header_size };

        self.map.remove(old_offset);
        self.map
            .add(offset, offset + header_size + data.size(), BlockOwner::Entry(name.to_string()))
            .map_err(|owner| Error::OverlappingEntries {
                first: name.to_string(),
                second: owner.to_string(),
            })?;
        // The data may still be a range of the old position; it is read in
        // full before the header goes out.
        data.with_bytes(|bytes| {
            self.write_at(offset, &header)?;
            self.write_at(offset + header_size, bytes)
        })
    }

    fn write_directory(&mut self) -> Result<()> {
        if self.entries.len() >= 0xffff {
            return Err(Error::UnsupportedFeature { feature: "ZIP64" });
        }
        let entries_end = self.map.used_size();
        let directory_offset = entries_end + self.extra_directory_offset;

        let mut written: Vec<&StoredEntry> = self.entries.values().collect();
        written.sort_by_key(|e| e.header.local_header_offset);
        let mut directory = Vec::new();
        for entry in written {
            entry.header.encode(&mut directory)?;
        }
        let eocd = Eocd {
            total_records: self.entries.len() as u16,
            directory_size: to_u32(directory.len() as u64)?,
            directory_offset: to_u32(directory_offset)?,
            comment: self.eocd_comment.clone(),
        }
        .encode();

        let eocd_offset = directory_offset + directory.len() as u64;
        let file_end = eocd_offset + eocd.len() as u64;
        self.directory_offset = directory_offset;
        self.directory_bytes = directory;
        self.eocd_offset = eocd_offset;
        self.eocd_bytes = eocd;

        self.notify(|extension, zfile| extension.entries_written(zfile))?;

        self.zero_range(entries_end, directory_offset)?;
        self.write_at(directory_offset, &self.directory_bytes)?;
        self.write_at(eocd_offset, &self.eocd_bytes)?;

        let placed = self
            .map
            .add(directory_offset, eocd_offset, BlockOwner::CentralDirectory)
            .and_then(|()| self.map.add(eocd_offset, file_end, BlockOwner::Eocd));
        if let Err(owner) = placed {
            return Err(Error::OverlappingEntries {
                first: BlockOwner::CentralDirectory.to_string(),
                second: owner.to_string(),
            });
        }
        self.map.truncate();

        let mut storage = storage::lock(&self.storage)?;
        storage.set_len(file_end)?;
        storage.sync()?;
        log::debug!(
            "wrote central directory of {} bytes at {}, file is {} bytes",
            eocd_offset - directory_offset,
            directory_offset,
            file_end
        );
        Ok(())
    }
}

/// Turns a pending entry into a staged one once its compression finishes.
///
/// The method and compressed size in the header become final here.
fn resolve(entry: &mut StoredEntry) -> Result<()> {
    let Content::Pending { future, .. } = &entry.content else {
        return Ok(());
    };
    let result = future.wait()?;
    let method_code = result.method().code();
    entry.header.method = method_code;
    entry.header.compressed_size = result.size();
    entry.header.version_to_extract = version_for(method_code, entry.is_directory());
    entry.content = Content::Staged {
        compressed: result.into_source(),
    };
    Ok(())
}
