//! The archive controller.
//!
//! A [`ZFile`] is a zip archive opened for random-access editing. Entries
//! are added and deleted in memory; nothing is written until
//! [`update`](ZFile::update) (or [`close`](ZFile::close)) runs the flush
//! protocol:
//!
//! 1. Extensions get a chance to make last changes.
//! 2. Entries are sorted by name if the options ask for it.
//! 3. Every pending compression is waited for. A failed compression ends
//!    the update before anything is written.
//! 4. Pending entries are written into the first gap large enough, or after
//!    the end of the file. The previous central directory is left in place
//!    until all of them are written.
//! 5. Gaps are covered with extra fields if the options ask for it, and
//!    whatever is left unused is zero-filled.
//! 6. The central directory and the end of central directory record are
//!    written after the last entry, and the file is truncated after them.
//!
//! ```text
//!   open ──► Open ──add/delete──► Dirty ──update──► Flushing ──► Open
//!                                                                 │
//!                                              close ──► Closed ◄─┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use zfile::{ZFile, ZFileOptions};
//!
//! # let dir = tempfile::tempdir()?;
//! # let path = dir.path().join("app.zip");
//! let mut zf = ZFile::open(&path)?;
//! zf.add_bytes("assets/readme.txt", b"hello hello hello hello".to_vec())?;
//! zf.add_with_compression("lib/native.so", &[0x7f, b'E', b'L', b'F'][..], false)?;
//! zf.update()?;
//!
//! assert_eq!(zf.read("assets/readme.txt")?, b"hello hello hello hello");
//! zf.delete("lib/native.so")?;
//! zf.close()?;
//!
//! let zf = ZFile::open_with_options(&path, ZFileOptions::new())?;
//! assert_eq!(zf.entries().count(), 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod mutate;
mod open;
mod query;
mod update;

use std::collections::BTreeMap;
use std::fmt;

use crate::entry::StoredEntry;
use crate::layout::FileUseMap;
use crate::options::ZFileOptions;
use crate::storage::SharedStorage;
use crate::verify::VerifyLog;
use crate::{Error, Result};

/// Lifecycle state of a [`ZFile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ZFileState {
    /// In sync with the file.
    Open,
    /// Changed in memory since the last update.
    Dirty,
    /// Writing an update.
    Flushing,
    /// Closed; no further changes are possible.
    Closed,
}

/// Hooks into the update cycle of a [`ZFile`].
///
/// Every method has a default that does nothing.
pub trait ZFileExtension: Send {
    /// Called before an update writes anything. Entries added here are
    /// written by the same update.
    fn before_update(&mut self, zfile: &mut ZFile) -> Result<()> {
        let _ = zfile;
        Ok(())
    }

    /// Called once every entry is written and the central directory and
    /// end of central directory bytes are known, before they are written.
    fn entries_written(&mut self, zfile: &ZFile) -> Result<()> {
        let _ = zfile;
        Ok(())
    }

    /// Called after an update completes.
    fn updated(&mut self, zfile: &ZFile) -> Result<()> {
        let _ = zfile;
        Ok(())
    }

    /// Called when the archive is closed.
    fn closed(&mut self) {}
}

/// A zip archive opened for editing.
///
/// Changes are kept in memory until [`update`](ZFile::update), which
/// writes pending entries into free space and then rewrites the central
/// directory. A `ZFile` is not meant to be shared between threads without
/// external locking; only compression runs elsewhere.
pub struct ZFile {
    pub(crate) storage: SharedStorage,
    pub(crate) read_only: bool,
    pub(crate) options: ZFileOptions,
    /// Entries keyed by name.
    pub(crate) entries: BTreeMap<String, StoredEntry>,
    /// Names of entries waiting to be written, in placement order.
    pub(crate) pending: Vec<String>,
    pub(crate) map: FileUseMap,
    pub(crate) directory_offset: u64,
    pub(crate) directory_bytes: Vec<u8>,
    pub(crate) eocd_offset: u64,
    pub(crate) eocd_bytes: Vec<u8>,
    pub(crate) eocd_comment: Vec<u8>,
    pub(crate) extra_directory_offset: u64,
    pub(crate) verify_log: Box<dyn VerifyLog>,
    pub(crate) extensions: Vec<Box<dyn ZFileExtension>>,
    pub(crate) dirty: bool,
    pub(crate) state: ZFileState,
}

impl ZFile {
    /// Returns the lifecycle state.
    pub fn state(&self) -> ZFileState {
        match self.state {
            ZFileState::Open if self.dirty => ZFileState::Dirty,
            state => state,
        }
    }

    /// Registers an extension.
    pub fn add_extension(&mut self, extension: Box<dyn ZFileExtension>) {
        self.extensions.push(extension);
    }

    /// Writes pending changes and closes the archive.
    ///
    /// Extensions are notified even if the final update fails.
    pub fn close(mut self) -> Result<()> {
        self.close_inner()
    }

    fn close_inner(&mut self) -> Result<()> {
        if self.state == ZFileState::Closed {
            return Ok(());
        }
        let result = if self.dirty && !self.read_only {
            self.update()
        } else {
            Ok(())
        };
        self.state = ZFileState::Closed;
        self.release_pending();
        for extension in &mut self.extensions {
            extension.closed();
        }
        result
    }

    /// Drops buffered entry data so the tracker goes back to zero.
    fn release_pending(&mut self) {
        self.pending.clear();
        self.entries.retain(|_, entry| !entry.is_pending());
    }

    pub(crate) fn check_writable(&self) -> Result<()> {
        if self.state == ZFileState::Closed {
            return Err(Error::Closed);
        }
        if self.read_only {
            return Err(Error::ReadOnly);
        }
        Ok(())
    }

    /// Runs `f` on every extension, letting it borrow the archive.
    pub(crate) fn notify(
        &mut self,
        mut f: impl FnMut(&mut dyn ZFileExtension, &mut ZFile) -> Result<()>,
    ) -> Result<()> {
        let mut extensions = std::mem::take(&mut self.extensions);
        let mut result = Ok(());
        for extension in &mut extensions {
            result = f(extension.as_mut(), self);
            if result.is_err() {
                break;
            }
        }
        // Extensions registered from inside a hook go after the existing ones.
        extensions.append(&mut self.extensions);
        self.extensions = extensions;
        result
    }
}

impl Drop for ZFile {
    fn drop(&mut self) {
        if let Err(e) = self.close_inner() {
            log::warn!("failed to update archive on drop: {}", e);
        }
    }
}

impl fmt::Debug for ZFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZFile")
            .field("state", &self.state())
            .field("read_only", &self.read_only)
            .field("entries", &self.entries.len())
            .field("pending", &self.pending.len())
            .field("directory_offset", &self.directory_offset)
            .field("extra_directory_offset", &self.extra_directory_offset)
            .finish_non_exhaustive()
    }
}
