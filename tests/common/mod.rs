//! Shared test utilities for integration tests.
//!
//! Archives used as input are either built by `ZFile` itself or assembled
//! byte by byte with [`RawEntry`], which can produce the layouts `ZFile`
//! never writes (data descriptors, mismatched headers).
//!
//! Note: `#![allow(dead_code)]` is required because each integration test file
//! compiles as a separate crate and may only use a subset of these helpers.

#![allow(dead_code)]

use std::io::{Cursor, Read};
use std::sync::Arc;

use zfile::checksum::{Checksum, Crc32};
use zfile::compress::StoreCompressor;
use zfile::layout::AlignmentRule;
use zfile::{MemoryStorage, ZFile, ZFileOptions};

/// Options with no timestamps and no alignment, so layouts are predictable.
pub fn plain_options() -> ZFileOptions {
    ZFileOptions::new()
        .no_timestamps(true)
        .alignment_rule(AlignmentRule::None)
}

/// Like [`plain_options`], but never compresses.
pub fn store_options() -> ZFileOptions {
    plain_options().compressor(Arc::new(StoreCompressor))
}

/// Opens an empty in-memory archive and returns it with a handle on its
/// bytes.
pub fn memory_zfile(options: ZFileOptions) -> (MemoryStorage, ZFile) {
    let storage = MemoryStorage::new();
    let zf = ZFile::open_storage(storage.clone(), options).unwrap();
    (storage, zf)
}

/// Opens `bytes` as an in-memory archive.
pub fn open_bytes(bytes: Vec<u8>, options: ZFileOptions) -> zfile::Result<(MemoryStorage, ZFile)> {
    let storage = MemoryStorage::from_vec(bytes);
    let zf = ZFile::open_storage(storage.clone(), options)?;
    Ok((storage, zf))
}

/// Builds an archive holding `entries` with `ZFile` and returns its bytes.
pub fn build_archive(options: ZFileOptions, entries: &[(&str, &[u8])]) -> Vec<u8> {
    let (storage, mut zf) = memory_zfile(options);
    for (name, data) in entries {
        zf.add_bytes(name, data.to_vec()).unwrap();
    }
    zf.close().unwrap();
    storage.contents()
}

/// Reads every entry of `bytes` with the `zip` crate, in central directory
/// order.
pub fn read_with_zip_crate(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut out = Vec::new();
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).unwrap();
        let mut data = Vec::new();
        file.read_to_end(&mut data).unwrap();
        out.push((file.name().to_string(), data));
    }
    out
}

/// Highly compressible data.
pub fn compressible(len: usize) -> Vec<u8> {
    b"the quick brown fox ".iter().copied().cycle().take(len).collect()
}

/// Incompressible data (deterministically seeded for reproducibility).
pub fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = vec![0u8; len];
    rng.fill(&mut data[..]);
    data
}

/// How a hand-made entry stores its data descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Descriptor {
    None,
    WithSignature,
    WithoutSignature,
}

/// A stored entry written byte by byte.
#[derive(Debug, Clone)]
pub struct RawEntry {
    pub name: String,
    pub data: Vec<u8>,
    pub descriptor: Descriptor,
    pub local_extra: Vec<u8>,
    pub local_version: u16,
    pub central_version: u16,
    pub local_name: Option<String>,
    pub local_crc: Option<u32>,
    pub descriptor_crc: Option<u32>,
}

impl RawEntry {
    pub fn new(name: &str, data: &[u8]) -> Self {
        Self {
            name: name.to_string(),
            data: data.to_vec(),
            descriptor: Descriptor::None,
            local_extra: Vec::new(),
            local_version: 10,
            central_version: 10,
            local_name: None,
            local_crc: None,
            descriptor_crc: None,
        }
    }

    pub fn descriptor(mut self, descriptor: Descriptor) -> Self {
        self.descriptor = descriptor;
        self
    }

    pub fn local_extra(mut self, extra: &[u8]) -> Self {
        self.local_extra = extra.to_vec();
        self
    }

    pub fn versions(mut self, local: u16, central: u16) -> Self {
        self.local_version = local;
        self.central_version = central;
        self
    }

    pub fn local_name(mut self, name: &str) -> Self {
        self.local_name = Some(name.to_string());
        self
    }

    pub fn local_crc(mut self, crc: u32) -> Self {
        self.local_crc = Some(crc);
        self
    }

    pub fn descriptor_crc(mut self, crc: u32) -> Self {
        self.descriptor_crc = Some(crc);
        self
    }
}

/// A hand-made archive and the offsets of its records.
#[derive(Debug, Clone)]
pub struct RawZip {
    pub bytes: Vec<u8>,
    pub local_offsets: Vec<usize>,
    pub central_offsets: Vec<usize>,
    pub directory_offset: usize,
    pub eocd_offset: usize,
}

impl RawZip {
    /// Overwrites a little-endian u32 at `pos`.
    pub fn put_u32(&mut self, pos: usize, value: u32) {
        self.bytes[pos..pos + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Overwrites a little-endian u16 at `pos`.
    pub fn put_u16(&mut self, pos: usize, value: u16) {
        self.bytes[pos..pos + 2].copy_from_slice(&value.to_le_bytes());
    }
}

fn u16le(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn u32le(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

/// Assembles a stored-only archive.
pub fn raw_zip(entries: &[RawEntry]) -> RawZip {
    let mut bytes = Vec::new();
    let mut local_offsets = Vec::new();

    for entry in entries {
        local_offsets.push(bytes.len());
        let crc = Crc32::compute(&entry.data);
        let size = entry.data.len() as u32;
        let has_descriptor = entry.descriptor != Descriptor::None;
        let local_name = entry.local_name.as_deref().unwrap_or(&entry.name);

        u32le(&mut bytes, 0x0403_4b50);
        u16le(&mut bytes, entry.local_version);
        u16le(&mut bytes, if has_descriptor { 1 << 3 } else { 0 });
        u16le(&mut bytes, 0);
        u16le(&mut bytes, 0);
        u16le(&mut bytes, 0x21);
        if has_descriptor {
            u32le(&mut bytes, 0);
            u32le(&mut bytes, 0);
            u32le(&mut bytes, 0);
        } else {
            u32le(&mut bytes, entry.local_crc.unwrap_or(crc));
            u32le(&mut bytes, size);
            u32le(&mut bytes, size);
        }
        u16le(&mut bytes, local_name.len() as u16);
        u16le(&mut bytes, entry.local_extra.len() as u16);
        bytes.extend_from_slice(local_name.as_bytes());
        bytes.extend_from_slice(&entry.local_extra);
        bytes.extend_from_slice(&entry.data);

        if has_descriptor {
            if entry.descriptor == Descriptor::WithSignature {
                u32le(&mut bytes, 0x0807_4b50);
            }
            u32le(&mut bytes, entry.descriptor_crc.unwrap_or(crc));
            u32le(&mut bytes, size);
            u32le(&mut bytes, size);
        }
    }

    let directory_offset = bytes.len();
    let mut central_offsets = Vec::new();
    for (entry, &offset) in entries.iter().zip(&local_offsets) {
        central_offsets.push(bytes.len());
        let size = entry.data.len() as u32;
        let has_descriptor = entry.descriptor != Descriptor::None;

        u32le(&mut bytes, 0x0201_4b50);
        u16le(&mut bytes, 20);
        u16le(&mut bytes, entry.central_version);
        u16le(&mut bytes, if has_descriptor { 1 << 3 } else { 0 });
        u16le(&mut bytes, 0);
        u16le(&mut bytes, 0);
        u16le(&mut bytes, 0x21);
        u32le(&mut bytes, Crc32::compute(&entry.data));
        u32le(&mut bytes, size);
        u32le(&mut bytes, size);
        u16le(&mut bytes, entry.name.len() as u16);
        u16le(&mut bytes, 0);
        u16le(&mut bytes, 0);
        u16le(&mut bytes, 0);
        u16le(&mut bytes, 0);
        u32le(&mut bytes, 0);
        u32le(&mut bytes, offset as u32);
        bytes.extend_from_slice(entry.name.as_bytes());
    }

    let eocd_offset = bytes.len();
    u32le(&mut bytes, 0x0605_4b50);
    u16le(&mut bytes, 0);
    u16le(&mut bytes, 0);
    u16le(&mut bytes, entries.len() as u16);
    u16le(&mut bytes, entries.len() as u16);
    u32le(&mut bytes, (eocd_offset - directory_offset) as u32);
    u32le(&mut bytes, directory_offset as u32);
    u16le(&mut bytes, 0);

    RawZip {
        bytes,
        local_offsets,
        central_offsets,
        directory_offset,
        eocd_offset,
    }
}
