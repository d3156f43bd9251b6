//! Random-access storage behind an archive.
//!
//! [`ZFile`](crate::ZFile) never touches the file system directly. It reads,
//! writes and truncates through the [`Storage`] trait, which has two
//! implementations:
//!
//! - [`FileStorage`]: a file on disk, created lazily on the first write and
//!   falling back to read-only access when write access is denied.
//! - [`MemoryStorage`]: a growable in-memory buffer, mainly for tests and
//!   for building archives that are never written to disk.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Random-access byte storage.
pub trait Storage: Send {
    /// Returns the current length in bytes.
    fn len(&mut self) -> io::Result<u64>;

    /// Returns `true` if the storage holds no bytes.
    fn is_empty(&mut self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Fills `buf` with the bytes starting at `offset`.
    ///
    /// Fails with `UnexpectedEof` if the range extends past the end.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()>;

    /// Writes `data` at `offset`, growing the storage if needed.
    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()>;

    /// Truncates or extends the storage to `len` bytes.
    fn set_len(&mut self, len: u64) -> io::Result<()>;

    /// Flushes written data to its backing medium.
    fn sync(&mut self) -> io::Result<()>;

    /// Returns `true` if writes will be refused.
    fn is_read_only(&self) -> bool {
        false
    }
}

/// Storage shared between an archive and the byte sources reading from it.
pub(crate) type SharedStorage = Arc<Mutex<Box<dyn Storage>>>;

pub(crate) fn lock(storage: &SharedStorage) -> io::Result<MutexGuard<'_, Box<dyn Storage>>> {
    storage
        .lock()
        .map_err(|_| io::Error::other("archive storage lock poisoned"))
}

/// A file on disk.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    file: Option<File>,
    read_only: bool,
}

impl FileStorage {
    /// Opens `path` for reading and writing.
    ///
    /// A missing file is not an error: it is created on the first write.
    /// If write access is denied the file is opened read-only.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        match OpenOptions::new().read(true).write(true).open(&path) {
            Ok(file) => Ok(Self {
                path,
                file: Some(file),
                read_only: false,
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self {
                path,
                file: None,
                read_only: false,
            }),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                let file = File::open(&path)?;
                log::debug!("{} is not writable, opening read-only", path.display());
                Ok(Self {
                    path,
                    file: Some(file),
                    read_only: true,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Opens `path` for reading only.
    pub fn open_read_only(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        Ok(Self {
            path,
            file: Some(file),
            read_only: true,
        })
    }

    /// Returns the path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file_for_write(&mut self) -> io::Result<&mut File> {
        if self.read_only {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{} was opened read-only", self.path.display()),
            ));
        }
        if self.file.is_none() {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&self.path)?;
            self.file = Some(file);
        }
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("file handle missing after creation"))
    }
}

impl Storage for FileStorage {
    fn len(&mut self) -> io::Result<u64> {
        match &self.file {
            Some(file) => Ok(file.metadata()?.len()),
            None => Ok(0),
        }
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        let file = self.file.as_mut().ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "file has not been created")
        })?;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        let file = self.file_for_write()?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        if self.file.is_none() && len == 0 {
            return Ok(());
        }
        self.file_for_write()?.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        match (&mut self.file, self.read_only) {
            (Some(file), false) => {
                file.flush()?;
                file.sync_data()
            }
            _ => Ok(()),
        }
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }
}

/// An in-memory archive.
///
/// Clones share the same buffer, so a test can keep a handle and inspect the
/// bytes after the archive is closed.
///
/// ```rust
/// use zfile::{MemoryStorage, ZFile, ZFileOptions};
///
/// let storage = MemoryStorage::new();
/// let mut zf = ZFile::open_storage(storage.clone(), ZFileOptions::new())?;
/// zf.add_bytes("hello.txt", b"hello".to_vec())?;
/// zf.close()?;
///
/// assert_eq!(&storage.contents()[..4], b"PK\x03\x04");
/// # Ok::<(), zfile::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    data: Arc<Mutex<Vec<u8>>>,
}

impl MemoryStorage {
    /// Creates an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a storage holding `data`.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(Mutex::new(data)),
        }
    }

    /// Returns a copy of the current contents.
    pub fn contents(&self) -> Vec<u8> {
        match self.data.lock() {
            Ok(data) => data.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn buffer(&self) -> io::Result<MutexGuard<'_, Vec<u8>>> {
        self.data
            .lock()
            .map_err(|_| io::Error::other("memory storage lock poisoned"))
    }
}

impl Storage for MemoryStorage {
    fn len(&mut self) -> io::Result<u64> {
        Ok(self.buffer()?.len() as u64)
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let data = self.buffer()?;
        let start = usize::try_from(offset).map_err(io::Error::other)?;
        let end = start
            .checked_add(buf.len())
            .filter(|&end| end <= data.len())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "read of {} bytes at {} past end of {} bytes",
                        buf.len(),
                        offset,
                        data.len()
                    ),
                )
            })?;
        buf.copy_from_slice(&data[start..end]);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, bytes: &[u8]) -> io::Result<()> {
        let mut data = self.buffer()?;
        let start = usize::try_from(offset).map_err(io::Error::other)?;
        let end = start + bytes.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(bytes);
        Ok(())
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        let len = usize::try_from(len).map_err(io::Error::other)?;
        self.buffer()?.resize(len, 0);
        Ok(())
    }

    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }
}
