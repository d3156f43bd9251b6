//! # zfile
//!
//! A random-access zip archive engine for tools that edit archives in place.
//!
//! Opening an archive reads its central directory into memory. Entries can
//! then be added, replaced, deleted, merged from other archives and
//! re-sorted; nothing touches the file until [`ZFile::update`] (or
//! [`ZFile::close`]) writes the pending entries into free space, rewrites
//! the central directory and truncates the file after it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use zfile::{Result, ZFile, ZFileOptions};
//! use zfile::layout::AlignmentRule;
//!
//! fn main() -> Result<()> {
//!     let options = ZFileOptions::new()
//!         .no_timestamps(true)
//!         .alignment_rule(AlignmentRule::constant_for_suffix(".so", 4096)?);
//!     let mut zf = ZFile::open_with_options("app.zip", options)?;
//!
//!     zf.add_bytes("res/values.txt", b"key=value\n".to_vec())?;
//!     zf.add_with_compression("lib/libnative.so", std::fs::File::open("libnative.so")?, false)?;
//!     zf.delete("obsolete.txt")?;
//!
//!     for entry in zf.entries() {
//!         println!("{}: {} bytes", entry.name(), entry.uncompressed_size());
//!     }
//!     zf.close()
//! }
//! ```
//!
//! ## Layout
//!
//! Space freed by deleted or replaced entries becomes a gap. New entries go
//! into the first gap large enough to hold them (see
//! [`FileUseMap`](layout::FileUseMap)), otherwise after the last entry.
//! Stored entries can be aligned with an [`AlignmentRule`](layout::AlignmentRule):
//! padding goes into an extra field segment of the local header, so the
//! data starts on the requested boundary.
//!
//! With [`ZFileOptions::cover_empty_space_using_extra_field`], gaps that
//! remain after placement are absorbed by the extra fields of neighbouring
//! entries instead of being left as unreferenced zero bytes.
//!
//! ## Compression
//!
//! Compression is pluggable through the [`Compressor`](compress::Compressor)
//! trait and may run on a thread pool. Deflate never enlarges data: output
//! that is not smaller than its input is stored instead.
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T>`]. See [`Error`] for the
//! error categories.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `parallel` | Yes | [`ThreadPoolExecutor`](compress::ThreadPoolExecutor) backed by rayon |
//!
//! ## Minimum Supported Rust Version (MSRV)
//!
//! This crate requires Rust 1.85 or later.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Default buffer size for read operations (8 KiB).
pub(crate) const READ_BUFFER_SIZE: usize = 8192;

pub mod bytes;
pub mod checksum;
pub mod codec;
pub mod compress;
pub mod entry;
pub mod error;
pub mod format;
pub mod layout;
pub mod options;
pub mod storage;
pub mod timestamp;
pub mod verify;

mod zfile;

pub use codec::CompressionMethod;
pub use entry::{CompressionInfo, EntryType, StoredEntry};
pub use error::{Error, Result};
pub use options::ZFileOptions;
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use timestamp::DosDateTime;
pub use verify::{VerifyLog, VerifyLogs};
pub use zfile::{ZFile, ZFileExtension, ZFileState};
