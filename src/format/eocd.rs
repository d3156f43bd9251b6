//! The end of central directory record.
//!
//! The record sits at the very end of the archive, followed only by its
//! comment. Because the comment may be up to 65535 bytes and may contain
//! anything, the record is located by scanning backwards for a signature
//! whose comment length ends exactly at the end of the file and whose
//! central directory ends exactly where the record starts.

use super::reader::{u16_at, u32_at, write_u16_le, write_u32_le};
use super::{EOCD_SIGNATURE, EOCD_SIZE, MAX_VARIABLE_FIELD_SIZE, ZIP64_LOCATOR_SIGNATURE};
use crate::{Error, Result};

/// Largest number of bytes at the end of a file that can hold the record.
pub const MAX_EOCD_SEARCH: usize = EOCD_SIZE + MAX_VARIABLE_FIELD_SIZE;

/// An end of central directory record.
///
/// ```text
/// offset size field
///      0    4 signature (PK\x05\x06)
///      4    2 number of this disk
///      6    2 disk where the central directory starts
///      8    2 central directory records on this disk
///     10    2 total central directory records
///     12    4 central directory size
///     16    4 central directory offset
///     20    2 comment length (n)
///     22    n comment
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eocd {
    /// Number of central directory records.
    pub total_records: u16,
    /// Size of the central directory in bytes.
    pub directory_size: u32,
    /// Offset of the central directory.
    pub directory_offset: u32,
    /// Archive comment.
    pub comment: Vec<u8>,
}

impl Eocd {
    /// Parses a record at the start of `bytes`.
    ///
    /// Returns `None` unless the bytes hold a self-consistent, single-disk
    /// record: the signature matches, both disk numbers are 0, the record
    /// counts agree and the comment fits in `bytes`.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if u32_at(bytes, 0)? != EOCD_SIGNATURE {
            return None;
        }
        let disk = u16_at(bytes, 4)?;
        let directory_disk = u16_at(bytes, 6)?;
        let records_on_disk = u16_at(bytes, 8)?;
        let total_records = u16_at(bytes, 10)?;
        let directory_size = u32_at(bytes, 12)?;
        let directory_offset = u32_at(bytes, 16)?;
        let comment_len = u16_at(bytes, 20)? as usize;
        if disk != 0 || directory_disk != 0 || records_on_disk != total_records {
            return None;
        }
        let comment = bytes.get(EOCD_SIZE..EOCD_SIZE + comment_len)?.to_vec();
        Some(Self {
            total_records,
            directory_size,
            directory_offset,
            comment,
        })
    }

    /// Returns the encoded size, comment included.
    pub fn size(&self) -> usize {
        EOCD_SIZE + self.comment.len()
    }

    /// Encodes the record.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.size());
        write_u32_le(&mut out, EOCD_SIGNATURE);
        write_u16_le(&mut out, 0);
        write_u16_le(&mut out, 0);
        write_u16_le(&mut out, self.total_records);
        write_u16_le(&mut out, self.total_records);
        write_u32_le(&mut out, self.directory_size);
        write_u32_le(&mut out, self.directory_offset);
        write_u16_le(&mut out, self.comment.len() as u16);
        out.extend_from_slice(&self.comment);
        out
    }

    /// Locates the record in the last bytes of an archive.
    ///
    /// `tail` holds the last bytes of the file (at most [`MAX_EOCD_SEARCH`])
    /// and `tail_offset` is the position of `tail[0]` in the file. Returns the
    /// offset of the record and the record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFormat`] if no record is found and
    /// [`Error::UnsupportedFeature`] for ZIP64 and multi-disk archives.
    pub fn find(tail: &[u8], tail_offset: u64) -> Result<(u64, Self)> {
        if tail.len() < EOCD_SIZE {
            return Err(Error::InvalidFormat(format!(
                "file of {} bytes is too small to hold an end of central directory record",
                tail_offset + tail.len() as u64
            )));
        }

        let mut loose: Option<(u64, Self)> = None;
        for pos in (0..=tail.len() - EOCD_SIZE).rev() {
            if u32_at(tail, pos) != Some(EOCD_SIGNATURE) {
                continue;
            }
            let comment_len = u16_at(tail, pos + 20).unwrap_or(0) as usize;
            if pos + EOCD_SIZE + comment_len != tail.len() {
                continue;
            }
            let disk = u16_at(tail, pos + 4).unwrap_or(0);
            let directory_disk = u16_at(tail, pos + 6).unwrap_or(0);
            if disk != 0 || directory_disk != 0 {
                return Err(Error::UnsupportedFeature {
                    feature: "multi-disk archives",
                });
            }
            let Some(eocd) = Self::parse(&tail[pos..]) else {
                continue;
            };
            let offset = tail_offset + pos as u64;
            if eocd.directory_offset == 0xffff_ffff
                || eocd.directory_size == 0xffff_ffff
                || eocd.total_records == 0xffff
                || (pos >= 20 && u32_at(tail, pos - 20) == Some(ZIP64_LOCATOR_SIGNATURE))
            {
                return Err(Error::UnsupportedFeature { feature: "ZIP64" });
            }
            let directory_end = eocd.directory_offset as u64 + eocd.directory_size as u64;
            if directory_end == offset {
                return Ok((offset, eocd));
            }
            if directory_end < offset && loose.is_none() {
                loose = Some((offset, eocd));
            }
        }

        loose.ok_or_else(|| {
            Error::InvalidFormat("end of central directory record not found".into())
        })
    }

    /// Checks that `comment` can be used as an archive comment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the comment is longer than 65535
    /// bytes or contains a record [`parse`](Self::parse) would accept, which
    /// would make the archive ambiguous to read.
    pub fn validate_comment(comment: &[u8]) -> Result<()> {
        if comment.len() > MAX_VARIABLE_FIELD_SIZE {
            return Err(Error::invalid_argument(format!(
                "comment is {} bytes, the limit is {}",
                comment.len(),
                MAX_VARIABLE_FIELD_SIZE
            )));
        }
        for pos in 0..comment.len().saturating_sub(3) {
            if u32_at(comment, pos) == Some(EOCD_SIGNATURE)
                && Self::parse(&comment[pos..]).is_some()
            {
                return Err(Error::invalid_argument(format!(
                    "comment contains an end of central directory record at byte {}",
                    pos
                )));
            }
        }
        Ok(())
    }
}
