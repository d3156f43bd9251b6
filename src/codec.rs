//! Encodings of entry data.
//!
//! Zip entries written by this crate are either stored (method 0) or
//! deflated (method 8, a raw RFC 1951 stream without the zlib wrapper).
//! Any other method code found in an archive is preserved when the archive
//! is edited but cannot be decoded.

use std::fmt;
use std::io::{self, Read};

use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;

use crate::{Error, Result};

/// Zip compression method codes.
pub mod method {
    /// Stored (no compression).
    pub const STORE: u16 = 0;
    /// Raw deflate.
    pub const DEFLATE: u16 = 8;

    /// Returns a human-readable name for a method code.
    pub fn name(code: u16) -> &'static str {
        match code {
            STORE => "Store",
            1 => "Shrink",
            6 => "Implode",
            DEFLATE => "Deflate",
            9 => "Deflate64",
            12 => "BZip2",
            14 => "LZMA",
            93 => "Zstandard",
            95 => "XZ",
            99 => "AES",
            _ => "Unknown",
        }
    }
}

/// A compression method this crate can read and write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionMethod {
    /// Data stored uncompressed (method 0).
    Store,
    /// Raw deflate (method 8).
    Deflate,
}

impl CompressionMethod {
    /// Returns the zip method code.
    pub const fn code(self) -> u16 {
        match self {
            Self::Store => method::STORE,
            Self::Deflate => method::DEFLATE,
        }
    }

    /// Maps a zip method code to a supported method.
    pub const fn from_code(code: u16) -> Option<Self> {
        match code {
            method::STORE => Some(Self::Store),
            method::DEFLATE => Some(Self::Deflate),
            _ => None,
        }
    }
}

impl fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(method::name(self.code()))
    }
}

/// Deflates everything `input` yields at `level` (0 to 9).
///
/// `size_hint` is the expected input size, used to size the output buffer.
pub fn deflate<R: Read>(mut input: R, level: u32, size_hint: u64) -> io::Result<Vec<u8>> {
    let capacity = usize::try_from(size_hint / 2).unwrap_or(0).min(1 << 26);
    let mut encoder = DeflateEncoder::new(Vec::with_capacity(capacity), Compression::new(level));
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()
}

/// Wraps `input`, the data of an entry as stored, in a reader yielding the
/// decoded data.
///
/// # Errors
///
/// Returns [`Error::UnsupportedMethod`] if `method_code` is neither store nor
/// deflate.
pub fn decoder<'a, R: Read + 'a>(
    input: R,
    method_code: u16,
    entry_name: &str,
) -> Result<Box<dyn Read + 'a>> {
    match CompressionMethod::from_code(method_code) {
        Some(CompressionMethod::Store) => Ok(Box::new(input)),
        Some(CompressionMethod::Deflate) => Ok(Box::new(DeflateDecoder::new(input))),
        None => Err(Error::UnsupportedMethod {
            method: method_code,
            entry_name: entry_name.to_string(),
        }),
    }
}

/// Decodes the data of an entry into a new buffer.
///
/// At most one byte more than `uncompressed_size` is produced, so data that
/// decodes to more than it declares shows up as a longer buffer instead of
/// being read to the end.
pub fn decode<R: Read>(
    input: R,
    method_code: u16,
    uncompressed_size: u64,
    entry_name: &str,
) -> Result<Vec<u8>> {
    let mut decoded = decoder(input, method_code, entry_name)?
        .take(uncompressed_size.saturating_add(1));
    let capacity = usize::try_from(uncompressed_size).unwrap_or(0).min(1 << 26);
    let mut out = Vec::with_capacity(capacity);
    decoded.read_to_end(&mut out).map_err(|e| {
        if e.kind() == io::ErrorKind::InvalidInput || e.kind() == io::ErrorKind::InvalidData {
            Error::InvalidFormat(format!("corrupt data in entry '{}': {}", entry_name, e))
        } else {
            Error::Io(e)
        }
    })?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_codes() {
        assert_eq!(CompressionMethod::Store.code(), 0);
        assert_eq!(CompressionMethod::Deflate.code(), 8);
        assert_eq!(CompressionMethod::from_code(8), Some(CompressionMethod::Deflate));
        assert_eq!(CompressionMethod::from_code(12), None);
        assert_eq!(method::name(12), "BZip2");
        assert_eq!(CompressionMethod::Deflate.to_string(), "Deflate");
    }

    #[test]
    fn test_deflate_is_raw_and_decodes() {
        let data = b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
        let compressed = deflate(&data[..], 9, data.len() as u64).unwrap();
        assert!(compressed.len() < data.len());
        // A zlib stream would start with 0x78.
        assert_ne!(compressed[0], 0x78);

        let out = decode(&compressed[..], method::DEFLATE, data.len() as u64, "a").unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_level_zero_still_decodes() {
        let data = vec![3u8; 1000];
        let compressed = deflate(&data[..], 0, 0).unwrap();
        assert!(compressed.len() > data.len());
        assert_eq!(decode(&compressed[..], method::DEFLATE, 1000, "z").unwrap(), data);
    }

    #[test]
    fn test_decode_stops_one_byte_past_declared_size() {
        let out = decode(&b"Hello, World!"[..], method::STORE, 5, "h").unwrap();
        assert_eq!(out, b"Hello,");
    }

    #[test]
    fn test_unsupported_method() {
        let err = decode(&b"xyz"[..], 14, 3, "lzma.bin").unwrap_err();
        assert!(matches!(err, Error::UnsupportedMethod { method: 14, .. }));
        assert_eq!(err.entry_name(), Some("lzma.bin"));
    }

    #[test]
    fn test_corrupt_deflate_stream() {
        let err = decode(&[0xff; 16][..], method::DEFLATE, 100, "bad").unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(_) | Error::Io(_)));
    }
}
