//! Central directory file headers.

use std::io::Read;

use super::names::EntryName;
use super::reader::{read_bytes, read_u16_le, read_u32_le, write_u16_le, write_u32_le};
use super::{CENTRAL_HEADER_SIGNATURE, CENTRAL_HEADER_SIZE, flags};
use crate::timestamp::DosDateTime;
use crate::{Error, Result};

/// Value of a 32-bit field whose real value lives in a ZIP64 extra field.
const ZIP64_SENTINEL: u32 = 0xffff_ffff;

/// A central directory file header.
///
/// ```text
/// offset size field
///      0    4 signature (PK\x01\x02)
///      4    2 version made by
///      6    2 version needed to extract
///      8    2 general purpose flags
///     10    2 compression method
///     12    2 last modified time
///     14    2 last modified date
///     16    4 CRC-32
///     20    4 compressed size
///     24    4 uncompressed size
///     28    2 name length (n)
///     30    2 extra field length (m)
///     32    2 comment length (k)
///     34    2 disk number start
///     36    2 internal attributes
///     38    4 external attributes
///     42    4 local header offset
///     46    n name, m extra field, k comment
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralDirectoryHeader {
    /// Version made by.
    pub version_made_by: u16,
    /// Version needed to extract.
    pub version_to_extract: u16,
    /// General purpose bit flags.
    pub flags: u16,
    /// Compression method code.
    pub method: u16,
    /// Last modification time.
    pub last_modified: DosDateTime,
    /// CRC-32 of the uncompressed data.
    pub crc32: u32,
    /// Compressed size.
    pub compressed_size: u64,
    /// Uncompressed size.
    pub uncompressed_size: u64,
    /// Disk on which the entry starts.
    pub disk_number_start: u16,
    /// Internal file attributes.
    pub internal_attributes: u16,
    /// External file attributes.
    pub external_attributes: u32,
    /// Offset of the local header.
    pub local_header_offset: u64,
    /// Entry name.
    pub name: EntryName,
    /// Central extra field, kept verbatim.
    pub extra: Vec<u8>,
    /// Entry comment.
    pub comment: Vec<u8>,
}

impl CentralDirectoryHeader {
    /// Parses one header from `r`.
    ///
    /// `offset` is the position of the header in the archive and is only used
    /// for error messages.
    pub fn parse<R: Read>(r: &mut R, offset: u64) -> Result<Self> {
        let corrupt = |reason: String| Error::corrupt_header(offset, reason);
        let signature =
            read_u32_le(r).map_err(|_| corrupt("truncated central directory".into()))?;
        if signature != CENTRAL_HEADER_SIGNATURE {
            return Err(corrupt(format!(
                "bad central directory header signature {:#010x}",
                signature
            )));
        }

        let mut fixed = [0u8; CENTRAL_HEADER_SIZE - 4];
        r.read_exact(&mut fixed)
            .map_err(|_| corrupt("truncated central directory header".into()))?;
        let mut f = &fixed[..];
        let version_made_by = read_u16_le(&mut f)?;
        let version_to_extract = read_u16_le(&mut f)?;
        let gp_flags = read_u16_le(&mut f)?;
        let method = read_u16_le(&mut f)?;
        let time = read_u16_le(&mut f)?;
        let date = read_u16_le(&mut f)?;
        let crc32 = read_u32_le(&mut f)?;
        let compressed_size = read_u32_le(&mut f)?;
        let uncompressed_size = read_u32_le(&mut f)?;
        let name_len = read_u16_le(&mut f)? as usize;
        let extra_len = read_u16_le(&mut f)? as usize;
        let comment_len = read_u16_le(&mut f)? as usize;
        let disk_number_start = read_u16_le(&mut f)?;
        let internal_attributes = read_u16_le(&mut f)?;
        let external_attributes = read_u32_le(&mut f)?;
        let local_header_offset = read_u32_le(&mut f)?;

        let raw_name = read_bytes(r, name_len)
            .map_err(|_| corrupt("truncated central directory entry name".into()))?;
        let extra = read_bytes(r, extra_len)
            .map_err(|_| corrupt("truncated central directory extra field".into()))?;
        let comment = read_bytes(r, comment_len)
            .map_err(|_| corrupt("truncated central directory comment".into()))?;

        if gp_flags & (flags::ENCRYPTED | flags::STRONG_ENCRYPTION) != 0 {
            return Err(Error::UnsupportedFeature {
                feature: "encrypted entries",
            });
        }
        if [compressed_size, uncompressed_size, local_header_offset].contains(&ZIP64_SENTINEL) {
            return Err(Error::UnsupportedFeature { feature: "ZIP64" });
        }
        if disk_number_start != 0 {
            return Err(Error::UnsupportedFeature {
                feature: "multi-disk archives",
            });
        }
        if raw_name.is_empty() {
            return Err(corrupt("central directory entry has an empty name".into()));
        }

        Ok(Self {
            version_made_by,
            version_to_extract,
            flags: gp_flags,
            method,
            last_modified: DosDateTime::from_raw(date, time),
            crc32,
            compressed_size: compressed_size as u64,
            uncompressed_size: uncompressed_size as u64,
            disk_number_start,
            internal_attributes,
            external_attributes,
            local_header_offset: local_header_offset as u64,
            name: EntryName::from_raw(raw_name, gp_flags),
            extra,
            comment,
        })
    }

    /// Returns the encoded size, variable fields included.
    pub fn size(&self) -> usize {
        CENTRAL_HEADER_SIZE + self.name.raw().len() + self.extra.len() + self.comment.len()
    }

    /// Returns `true` if a data descriptor follows the entry data.
    pub fn uses_data_descriptor(&self) -> bool {
        self.flags & flags::DATA_DESCRIPTOR != 0
    }

    /// Encodes the header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedFeature`] if a size or offset needs ZIP64.
    pub fn encode(&self, out: &mut Vec<u8>) -> Result<()> {
        let compressed_size = to_u32(self.compressed_size)?;
        let uncompressed_size = to_u32(self.uncompressed_size)?;
        let local_header_offset = to_u32(self.local_header_offset)?;

        write_u32_le(out, CENTRAL_HEADER_SIGNATURE);
        write_u16_le(out, self.version_made_by);
        write_u16_le(out, self.version_to_extract);
        write_u16_le(out, self.flags);
        write_u16_le(out, self.method);
        write_u16_le(out, self.last_modified.raw_time());
        write_u16_le(out, self.last_modified.raw_date());
        write_u32_le(out, self.crc32);
        write_u32_le(out, compressed_size);
        write_u32_le(out, uncompressed_size);
        write_u16_le(out, self.name.raw().len() as u16);
        write_u16_le(out, self.extra.len() as u16);
        write_u16_le(out, self.comment.len() as u16);
        write_u16_le(out, self.disk_number_start);
        write_u16_le(out, self.internal_attributes);
        write_u32_le(out, self.external_attributes);
        write_u32_le(out, local_header_offset);
        out.extend_from_slice(self.name.raw());
        out.extend_from_slice(&self.extra);
        out.extend_from_slice(&self.comment);
        Ok(())
    }
}

/// Narrows a size or offset to the 32-bit zip field.
pub(crate) fn to_u32(value: u64) -> Result<u32> {
    match u32::try_from(value) {
        Ok(v) if v != ZIP64_SENTINEL => Ok(v),
        _ => Err(Error::UnsupportedFeature { feature: "ZIP64" }),
    }
}
