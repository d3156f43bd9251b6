//! Zip record formats.
//!
//! This module contains the signatures, fixed sizes and flags of the PKZIP
//! structures handled by this crate, and the parsers and encoders for them:
//!
//! - [`local`]: local file headers and data descriptors
//! - [`central`]: central directory file headers
//! - [`eocd`]: the end of central directory record
//! - [`extra`]: extra fields, including the alignment segment
//! - [`names`]: entry name encoding
//!
//! All integers are little-endian. ZIP64 records, encryption and multi-disk
//! archives are not supported.

pub mod central;
pub mod eocd;
pub mod extra;
pub mod local;
pub mod names;
pub mod reader;

/// Signature of a local file header (`PK\x03\x04`).
pub const LOCAL_HEADER_SIGNATURE: u32 = 0x0403_4b50;

/// Signature of a central directory file header (`PK\x01\x02`).
pub const CENTRAL_HEADER_SIGNATURE: u32 = 0x0201_4b50;

/// Signature of the end of central directory record (`PK\x05\x06`).
pub const EOCD_SIGNATURE: u32 = 0x0605_4b50;

/// Optional signature of a data descriptor (`PK\x07\x08`).
pub const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x0807_4b50;

/// Signature of the ZIP64 end of central directory locator (`PK\x06\x07`).
pub const ZIP64_LOCATOR_SIGNATURE: u32 = 0x0706_4b50;

/// Fixed size of a local file header, before the name and extra field.
pub const LOCAL_HEADER_SIZE: usize = 30;

/// Fixed size of a central directory file header, before the variable fields.
pub const CENTRAL_HEADER_SIZE: usize = 46;

/// Size of the end of central directory record without its comment.
pub const EOCD_SIZE: usize = 22;

/// Size of the ZIP64 end of central directory locator.
pub const ZIP64_LOCATOR_SIZE: usize = 20;

/// Largest comment, name or extra field a 16-bit length can describe.
pub const MAX_VARIABLE_FIELD_SIZE: usize = 0xffff;

/// General purpose bit flags.
pub mod flags {
    /// The entry is encrypted.
    pub const ENCRYPTED: u16 = 1;
    /// Sizes and CRC follow the data in a data descriptor.
    pub const DATA_DESCRIPTOR: u16 = 1 << 3;
    /// Strong encryption.
    pub const STRONG_ENCRYPTION: u16 = 1 << 6;
    /// The name and comment are UTF-8.
    pub const UTF8: u16 = 1 << 11;
}

/// "Version needed to extract" values.
pub mod version {
    /// Version 1.0: stored files.
    pub const DEFAULT: u16 = 10;
    /// Version 2.0: deflate and directories.
    pub const DEFLATE_OR_DIRECTORY: u16 = 20;
    /// Highest version this crate claims to extract.
    pub const MAX_SUPPORTED: u16 = 20;
    /// "Version made by" written for new entries: MS-DOS host, version 2.0.
    pub const MADE_BY: u16 = 20;
}
