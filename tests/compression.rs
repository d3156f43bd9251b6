//! Integration tests for compressors as seen through `ZFile`.

mod common;

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::{compressible, memory_zfile, open_bytes, plain_options, random_bytes};
use zfile::bytes::{ByteSource, ByteTracker};
use zfile::compress::{
    BEST_LEVEL, BestAndDefaultDeflateExecutorCompressor, CompressionFuture, CompressionResult,
    Compressor, DeflateExecutionCompressor, InlineExecutor,
};
use zfile::{CompressionMethod, Error, MemoryStorage, Storage, ZFile, ZFileState};

#[test]
fn test_deflate_store_and_gap_reuse_scenario() {
    let compressor = DeflateExecutionCompressor::inline(BEST_LEVEL).unwrap();
    let (storage, mut zf) = memory_zfile(plain_options().compressor(Arc::new(compressor)));

    zf.add_bytes("a.txt", b"aaaaaaaaaa".to_vec()).unwrap();
    zf.update().unwrap();
    let a = zf.compression_info("a.txt").unwrap();
    assert_eq!(a.method(), Some(CompressionMethod::Deflate));
    assert!(a.compressed_size < 10);
    let a_offset = zf.get("a.txt").unwrap().local_header_offset();

    zf.add_bytes("b.bin", random_bytes(10, 0xB1B1)).unwrap();
    zf.update().unwrap();
    let b = zf.compression_info("b.bin").unwrap();
    assert_eq!(b.method(), Some(CompressionMethod::Store));
    assert_eq!(b.compressed_size, 10);

    zf.delete("a.txt").unwrap();
    zf.add_bytes("c.txt", b"cc".to_vec()).unwrap();
    zf.update().unwrap();
    assert_eq!(zf.get("c.txt").unwrap().local_header_offset(), a_offset);
    zf.close().unwrap();

    let (_, zf) = open_bytes(storage.contents(), plain_options()).unwrap();
    assert_eq!(zf.read("c.txt").unwrap(), b"cc");
    assert_eq!(zf.read("b.bin").unwrap(), random_bytes(10, 0xB1B1));
}

#[test]
fn test_best_and_default_choices() {
    let data = compressible(20_000);
    let executor = Arc::new(InlineExecutor);

    let always_default =
        BestAndDefaultDeflateExecutorCompressor::new(executor.clone(), 0.0).unwrap();
    let (_, mut zf) = memory_zfile(plain_options().compressor(Arc::new(always_default)));
    zf.add_bytes("x", data.clone()).unwrap();
    let default_size = zf.compression_info("x").unwrap().compressed_size;

    let always_best = BestAndDefaultDeflateExecutorCompressor::new(executor, 1.0).unwrap();
    let (_, mut zf) = memory_zfile(plain_options().compressor(Arc::new(always_best)));
    zf.add_bytes("x", data.clone()).unwrap();
    let best_size = zf.compression_info("x").unwrap().compressed_size;

    assert!(best_size <= default_size);
    assert_eq!(zf.read("x").unwrap(), data);
}

#[test]
fn test_invalid_min_ratio_is_rejected() {
    let executor = Arc::new(InlineExecutor);
    for ratio in [-0.1, 1.5, f64::NAN] {
        let err =
            BestAndDefaultDeflateExecutorCompressor::new(executor.clone(), ratio).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}

#[cfg(feature = "parallel")]
#[test]
fn test_thread_pool_compression() {
    use std::num::NonZeroUsize;
    use zfile::compress::{ThreadPoolExecutor, Threads};

    let executor = ThreadPoolExecutor::new(Threads::Count(NonZeroUsize::new(3).unwrap())).unwrap();
    let compressor = DeflateExecutionCompressor::new(6, Arc::new(executor)).unwrap();
    let (storage, mut zf) = memory_zfile(plain_options().compressor(Arc::new(compressor)));

    for i in 0..16 {
        zf.add_bytes(&format!("file{:02}.txt", i), compressible(1000 + i * 10))
            .unwrap();
    }
    zf.close().unwrap();

    let (_, zf) = open_bytes(storage.contents(), plain_options()).unwrap();
    for i in 0..16 {
        assert_eq!(
            zf.read(&format!("file{:02}.txt", i)).unwrap(),
            compressible(1000 + i * 10)
        );
    }
}

struct FailingCompressor;

impl Compressor for FailingCompressor {
    fn compress(&self, _source: ByteSource, _tracker: &Arc<ByteTracker>) -> CompressionFuture {
        CompressionFuture::ready(Err(Error::CompressionFailed("disk full of fish".into())))
    }
}

#[test]
fn test_failed_compression_keeps_archive_dirty() {
    let (storage, mut zf) = memory_zfile(plain_options().compressor(Arc::new(FailingCompressor)));
    zf.add_with_compression("safe", &b"stored"[..], false).unwrap();
    zf.add_bytes("doomed", b"deflate me".to_vec()).unwrap();

    let err = zf.update().unwrap_err();
    assert!(matches!(err, Error::CompressionFailed(ref m) if m.contains("fish")));
    assert_eq!(zf.state(), ZFileState::Dirty);

    zf.delete("doomed").unwrap();
    zf.update().unwrap();
    zf.close().unwrap();

    let (_, zf) = open_bytes(storage.contents(), plain_options()).unwrap();
    assert_eq!(zf.entries().count(), 1);
    assert_eq!(zf.read("safe").unwrap(), b"stored");
}

/// Stores everything except data starting with `reject`.
struct RejectingCompressor;

impl Compressor for RejectingCompressor {
    fn compress(&self, source: ByteSource, _tracker: &Arc<ByteTracker>) -> CompressionFuture {
        if source.read().unwrap().starts_with(b"reject") {
            return CompressionFuture::ready(Err(Error::Io(io::Error::new(
                io::ErrorKind::StorageFull,
                "no room for scratch data",
            ))));
        }
        CompressionFuture::ready(Ok(CompressionResult::from_source(
            CompressionMethod::Store,
            source,
        )))
    }
}

#[test]
fn test_failed_compression_leaves_previous_archive_untouched() {
    let options = || plain_options().compressor(Arc::new(RejectingCompressor));
    let (storage, mut zf) = memory_zfile(options());
    zf.add_bytes("a", b"first entry".to_vec()).unwrap();
    zf.update().unwrap();
    let before = storage.contents();

    zf.add_bytes("c", b"fine".to_vec()).unwrap();
    zf.add_bytes("d", b"reject me".to_vec()).unwrap();
    let is_storage_full =
        |err: &Error| matches!(err, Error::Io(e) if e.kind() == io::ErrorKind::StorageFull);
    assert!(is_storage_full(&zf.compression_info("d").unwrap_err()));
    assert!(is_storage_full(&zf.update().unwrap_err()));
    assert_eq!(storage.contents(), before);

    let (_, previous) = open_bytes(before, plain_options()).unwrap();
    assert_eq!(previous.entries().count(), 1);
    assert_eq!(previous.read("a").unwrap(), b"first entry");

    zf.delete("d").unwrap();
    zf.close().unwrap();
    let (_, zf) = open_bytes(storage.contents(), plain_options()).unwrap();
    assert_eq!(zf.read("a").unwrap(), b"first entry");
    assert_eq!(zf.read("c").unwrap(), b"fine");
}

/// Memory storage that refuses writes once its budget is spent.
struct WriteBudget {
    inner: MemoryStorage,
    writes_left: Arc<AtomicUsize>,
}

impl Storage for WriteBudget {
    fn len(&mut self) -> io::Result<u64> {
        self.inner.len()
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.inner.read_at(offset, buf)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        let left = self.writes_left.load(Ordering::SeqCst);
        if left == 0 {
            return Err(io::Error::other("write budget spent"));
        }
        self.writes_left.store(left - 1, Ordering::SeqCst);
        self.inner.write_at(offset, data)
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        self.inner.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_failed_entry_write_keeps_previous_directory() {
    let bytes = common::build_archive(plain_options(), &[("a", b"first entry")]);
    let inner = MemoryStorage::from_vec(bytes.clone());
    let writes_left = Arc::new(AtomicUsize::new(usize::MAX));
    let storage = WriteBudget {
        inner: inner.clone(),
        writes_left: Arc::clone(&writes_left),
    };
    let mut zf = ZFile::open_storage(storage, plain_options()).unwrap();

    zf.add_with_compression("c", &b"fine"[..], false).unwrap();
    zf.add_with_compression("d", &b"second"[..], false).unwrap();
    // Header and data of "c" go through; "d" fails.
    writes_left.store(2, Ordering::SeqCst);
    assert!(matches!(zf.update().unwrap_err(), Error::Io(_)));
    assert_eq!(zf.state(), ZFileState::Dirty);

    let after = inner.contents();
    assert_eq!(&after[..bytes.len()], &bytes[..]);
    let (_, previous) = open_bytes(bytes, plain_options()).unwrap();
    assert_eq!(previous.read("a").unwrap(), b"first entry");

    writes_left.store(usize::MAX, Ordering::SeqCst);
    zf.close().unwrap();
    let (_, zf) = open_bytes(inner.contents(), plain_options()).unwrap();
    assert_eq!(zf.entries().count(), 3);
    assert_eq!(zf.read("c").unwrap(), b"fine");
    assert_eq!(zf.read("d").unwrap(), b"second");
}
