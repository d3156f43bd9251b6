//! Error types for zip archive operations.
//!
//! This module provides the [`Error`] enum which represents all possible
//! failure modes when opening, editing and flushing zip archives, along with
//! a convenient [`Result<T>`] type alias.
//!
//! # Error Handling
//!
//! All fallible operations in this crate return `Result<T, Error>`. Errors fall
//! into four groups:
//!
//! | Category | Variants | Raised |
//! |----------|----------|--------|
//! | I/O | [`Io`][Error::Io] | Whenever the storage fails; never swallowed |
//! | Format | [`InvalidFormat`][Error::InvalidFormat], [`CorruptHeader`][Error::CorruptHeader], [`CrcMismatch`][Error::CrcMismatch], [`OverlappingEntries`][Error::OverlappingEntries], [`EntryOutsideFile`][Error::EntryOutsideFile] | At open or read time |
//! | Argument | [`InvalidArgument`][Error::InvalidArgument] | Synchronously, at construction time |
//! | Compression | [`CompressionFailed`][Error::CompressionFailed] | When a deferred compression is awaited |
//!
//! ```rust,no_run
//! use zfile::{Error, ZFile};
//!
//! fn open(path: &str) -> zfile::Result<ZFile> {
//!     match ZFile::open(path) {
//!         Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::PermissionDenied => {
//!             eprintln!("Permission denied: {}", path);
//!             Err(Error::Io(e))
//!         }
//!         Err(e) if e.is_format_error() => {
//!             eprintln!("Not a valid zip file: {}", e);
//!             Err(e)
//!         }
//!         other => other,
//!     }
//! }
//! ```

use std::io;

/// Helper struct for formatting CrcMismatch error messages.
struct CrcMismatchDisplay<'a> {
    entry_name: &'a str,
    expected: u32,
    actual: u32,
}

impl std::fmt::Display for CrcMismatchDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CRC32 mismatch for entry '{}': expected {:#010x}, got {:#010x}",
            self.entry_name, self.expected, self.actual
        )
    }
}

/// The main error type for zip archive operations.
///
/// Each variant includes the context needed to identify what failed; format
/// errors always name the offending entry when one is involved.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred while reading, writing or truncating the archive.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The file is not a zip archive or its structure cannot be understood.
    #[error("Invalid zip format: {0}")]
    InvalidFormat(String),

    /// A record of the archive is corrupt or truncated.
    ///
    /// The offset is the position in the archive file where the problem was
    /// detected.
    #[error("Corrupt header at offset {offset:#x}: {reason}")]
    CorruptHeader {
        /// The byte offset where corruption was detected.
        offset: u64,
        /// A description of the corruption.
        reason: String,
    },

    /// The data of an entry does not hash to the CRC-32 recorded for it.
    #[error("{}", CrcMismatchDisplay { entry_name, expected: *expected, actual: *actual })]
    CrcMismatch {
        /// The name of the entry with the CRC mismatch.
        entry_name: String,
        /// The CRC-32 recorded in the central directory.
        expected: u32,
        /// The CRC-32 of the data actually read.
        actual: u32,
    },

    /// Two regions of the archive claim the same bytes.
    ///
    /// Either region may be an entry or the central directory.
    #[error("'{first}' overlaps with '{second}'")]
    OverlappingEntries {
        /// The region that was being placed.
        first: String,
        /// The region already occupying the bytes.
        second: String,
    },

    /// An entry extends beyond the end of the archive file.
    #[error("Entry '{entry_name}' ends at {end}, beyond EOF at {file_size}")]
    EntryOutsideFile {
        /// The name of the entry.
        entry_name: String,
        /// Offset one past the last byte of the entry.
        end: u64,
        /// Size of the archive file.
        file_size: u64,
    },

    /// The archive uses a compression method this crate cannot decode.
    ///
    /// Only method `0` (store) and method `8` (deflate) are supported.
    #[error("Unsupported compression method {method} in entry '{entry_name}'")]
    UnsupportedMethod {
        /// The zip method code.
        method: u16,
        /// The entry using it.
        entry_name: String,
    },

    /// A feature required by the archive is not supported.
    ///
    /// This covers ZIP64, encryption and multi-disk archives.
    #[error("Unsupported feature: {feature}")]
    UnsupportedFeature {
        /// The name of the unsupported feature.
        feature: &'static str,
    },

    /// An argument was rejected when it was supplied.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The named entry does not exist in the archive.
    #[error("Entry not found: {name}")]
    EntryNotFound {
        /// The name that was looked up.
        name: String,
    },

    /// The archive was opened read-only and cannot be modified.
    #[error("Archive is read-only")]
    ReadOnly,

    /// The archive or byte source was already closed.
    #[error("Already closed")]
    Closed,

    /// A compression task terminated without producing a result.
    ///
    /// Errors returned by a compressor are propagated unchanged; this variant
    /// is only used when the task itself disappeared (for example it panicked
    /// on a pool thread).
    #[error("Compression failed: {0}")]
    CompressionFailed(String),

    /// A byte tracker ceiling was exceeded.
    #[error("Resource limit exceeded: {0}")]
    ResourceLimitExceeded(String),
}

impl Error {
    /// Returns `true` if this error describes a malformed archive.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidFormat(_)
                | Error::CorruptHeader { .. }
                | Error::CrcMismatch { .. }
                | Error::OverlappingEntries { .. }
                | Error::EntryOutsideFile { .. }
        )
    }

    /// Returns `true` if this error might be recoverable.
    ///
    /// Only transient I/O errors qualify. Nothing in this crate retries on its
    /// own; retrying is up to the caller.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted | io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }

    /// Returns `true` if this error is related to unsupported features or methods.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedMethod { .. } | Error::UnsupportedFeature { .. }
        )
    }

    /// Returns the entry name associated with this error, if any.
    pub fn entry_name(&self) -> Option<&str> {
        match self {
            Error::CrcMismatch { entry_name, .. } => Some(entry_name),
            Error::EntryOutsideFile { entry_name, .. } => Some(entry_name),
            Error::UnsupportedMethod { entry_name, .. } => Some(entry_name),
            Error::EntryNotFound { name } => Some(name),
            _ => None,
        }
    }

    /// Returns an error of the same variant and message.
    ///
    /// I/O errors keep their kind but lose their source.
    pub(crate) fn replicate(&self) -> Self {
        match self {
            Error::Io(e) => Error::Io(io::Error::new(e.kind(), e.to_string())),
            Error::InvalidFormat(m) => Error::InvalidFormat(m.clone()),
            Error::CorruptHeader { offset, reason } => Error::CorruptHeader {
                offset: *offset,
                reason: reason.clone(),
            },
            Error::CrcMismatch {
                entry_name,
                expected,
                actual,
            } => Error::CrcMismatch {
                entry_name: entry_name.clone(),
                expected: *expected,
                actual: *actual,
            },
            Error::OverlappingEntries { first, second } => Error::OverlappingEntries {
                first: first.clone(),
                second: second.clone(),
            },
            Error::EntryOutsideFile {
                entry_name,
                end,
                file_size,
            } => Error::EntryOutsideFile {
                entry_name: entry_name.clone(),
                end: *end,
                file_size: *file_size,
            },
            Error::UnsupportedMethod { method, entry_name } => Error::UnsupportedMethod {
                method: *method,
                entry_name: entry_name.clone(),
            },
            Error::UnsupportedFeature { feature } => Error::UnsupportedFeature { feature },
            Error::InvalidArgument(m) => Error::InvalidArgument(m.clone()),
            Error::EntryNotFound { name } => Error::EntryNotFound { name: name.clone() },
            Error::ReadOnly => Error::ReadOnly,
            Error::Closed => Error::Closed,
            Error::CompressionFailed(m) => Error::CompressionFailed(m.clone()),
            Error::ResourceLimitExceeded(m) => Error::ResourceLimitExceeded(m.clone()),
        }
    }

    /// Creates a CorruptHeader error.
    pub fn corrupt_header(offset: u64, reason: impl Into<String>) -> Self {
        Error::CorruptHeader {
            offset,
            reason: reason.into(),
        }
    }

    /// Creates an InvalidArgument error.
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Error::InvalidArgument(reason.into())
    }
}

/// A specialized Result type for zip operations.
pub type Result<T> = std::result::Result<T, Error>;
