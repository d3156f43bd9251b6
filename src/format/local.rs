//! Local file headers and data descriptors.

use std::io::Read;

use super::reader::{read_bytes, read_u16_le, read_u32_le, u32_at, write_u16_le, write_u32_le};
use super::{DATA_DESCRIPTOR_SIGNATURE, LOCAL_HEADER_SIGNATURE, LOCAL_HEADER_SIZE};
use crate::timestamp::DosDateTime;
use crate::{Error, Result};

/// A local file header.
///
/// ```text
/// offset size field
///      0    4 signature (PK\x03\x04)
///      4    2 version needed to extract
///      6    2 general purpose flags
///      8    2 compression method
///     10    2 last modified time
///     12    2 last modified date
///     14    4 CRC-32
///     18    4 compressed size
///     22    4 uncompressed size
///     26    2 name length (n)
///     28    2 extra field length (m)
///     30    n name
///   30+n    m extra field
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalHeader {
    /// Version needed to extract.
    pub version_to_extract: u16,
    /// General purpose bit flags.
    pub flags: u16,
    /// Compression method code.
    pub method: u16,
    /// Last modification time.
    pub last_modified: DosDateTime,
    /// CRC-32 of the uncompressed data (0 if deferred to a data descriptor).
    pub crc32: u32,
    /// Compressed size (0 if deferred to a data descriptor).
    pub compressed_size: u32,
    /// Uncompressed size (0 if deferred to a data descriptor).
    pub uncompressed_size: u32,
    /// Raw name bytes.
    pub name: Vec<u8>,
    /// Raw extra field.
    pub extra: Vec<u8>,
}

impl LocalHeader {
    /// Parses a local header from `r`.
    ///
    /// `offset` is the position of the header in the archive and is only used
    /// for error messages.
    pub fn parse<R: Read>(r: &mut R, offset: u64) -> Result<Self> {
        let corrupt = |reason: &str| Error::corrupt_header(offset, reason.to_string());
        let signature = read_u32_le(r).map_err(|_| corrupt("truncated local header"))?;
        if signature != LOCAL_HEADER_SIGNATURE {
            return Err(corrupt(&format!(
                "bad local header signature {:#010x}",
                signature
            )));
        }

        let mut fixed = [0u8; LOCAL_HEADER_SIZE - 4];
        r.read_exact(&mut fixed)
            .map_err(|_| corrupt("truncated local header"))?;
        let mut f = &fixed[..];
        let version_to_extract = read_u16_le(&mut f)?;
        let flags = read_u16_le(&mut f)?;
        let method = read_u16_le(&mut f)?;
        let time = read_u16_le(&mut f)?;
        let date = read_u16_le(&mut f)?;
        let crc32 = read_u32_le(&mut f)?;
        let compressed_size = read_u32_le(&mut f)?;
        let uncompressed_size = read_u32_le(&mut f)?;
        let name_len = read_u16_le(&mut f)? as usize;
        let extra_len = read_u16_le(&mut f)? as usize;

        let name = read_bytes(r, name_len).map_err(|_| corrupt("truncated local header name"))?;
        let extra =
            read_bytes(r, extra_len).map_err(|_| corrupt("truncated local header extra field"))?;

        Ok(Self {
            version_to_extract,
            flags,
            method,
            last_modified: DosDateTime::from_raw(date, time),
            crc32,
            compressed_size,
            uncompressed_size,
            name,
            extra,
        })
    }

    /// Returns the encoded size, name and extra field included.
    pub fn size(&self) -> usize {
        LOCAL_HEADER_SIZE + self.name.len() + self.extra.len()
    }

    /// Encodes the header.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.size());
        write_u32_le(&mut out, LOCAL_HEADER_SIGNATURE);
        write_u16_le(&mut out, self.version_to_extract);
        write_u16_le(&mut out, self.flags);
        write_u16_le(&mut out, self.method);
        write_u16_le(&mut out, self.last_modified.raw_time());
        write_u16_le(&mut out, self.last_modified.raw_date());
        write_u32_le(&mut out, self.crc32);
        write_u32_le(&mut out, self.compressed_size);
        write_u32_le(&mut out, self.uncompressed_size);
        write_u16_le(&mut out, self.name.len() as u16);
        write_u16_le(&mut out, self.extra.len() as u16);
        out.extend_from_slice(&self.name);
        out.extend_from_slice(&self.extra);
        out
    }
}

/// How the data descriptor of an entry is stored, if it has one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataDescriptorType {
    /// No data descriptor follows the data.
    #[default]
    None,
    /// `PK\x07\x08`, CRC-32, compressed size, uncompressed size.
    WithSignature,
    /// CRC-32, compressed size, uncompressed size.
    WithoutSignature,
}

impl DataDescriptorType {
    /// Returns the size of the descriptor in bytes.
    pub fn size(&self) -> u64 {
        match self {
            Self::None => 0,
            Self::WithSignature => 16,
            Self::WithoutSignature => 12,
        }
    }
}

/// The values recorded in a data descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataDescriptor {
    /// How the descriptor was stored.
    pub kind: DataDescriptorType,
    /// CRC-32 of the uncompressed data.
    pub crc32: u32,
    /// Compressed size.
    pub compressed_size: u32,
    /// Uncompressed size.
    pub uncompressed_size: u32,
}

impl DataDescriptor {
    /// Parses a descriptor from the bytes following the entry data.
    ///
    /// `bytes` must hold at least 12 bytes; 16 are needed when the optional
    /// signature is present.
    pub fn parse(bytes: &[u8], offset: u64) -> Result<Self> {
        let truncated = || Error::corrupt_header(offset, "truncated data descriptor");
        let first = u32_at(bytes, 0).ok_or_else(truncated)?;
        let (kind, base) = if first == DATA_DESCRIPTOR_SIGNATURE {
            (DataDescriptorType::WithSignature, 4)
        } else {
            (DataDescriptorType::WithoutSignature, 0)
        };
        Ok(Self {
            kind,
            crc32: u32_at(bytes, base).ok_or_else(truncated)?,
            compressed_size: u32_at(bytes, base + 4).ok_or_else(truncated)?,
            uncompressed_size: u32_at(bytes, base + 8).ok_or_else(truncated)?,
        })
    }
}
