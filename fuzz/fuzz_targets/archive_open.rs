//! Fuzz target for ZFile::open_storage with arbitrary byte input.
//!
//! This target exercises the central directory and local header parsing
//! with malformed or adversarial input, looking for panics and hangs.
//!
//! Run with: cargo +nightly fuzz run archive_open

#![no_main]

use libfuzzer_sys::fuzz_target;
use zfile::verify::VerifyLogs;
use zfile::{MemoryStorage, ZFile, ZFileOptions};

fuzz_target!(|data: &[u8]| {
    let storage = MemoryStorage::from_vec(data.to_vec());
    let options = ZFileOptions::new().verify_log_factory(VerifyLogs::unlimited_factory());
    let Ok(zf) = ZFile::open_storage(storage, options) else {
        return;
    };

    let names: Vec<String> = zf.entries().map(|e| e.name().to_string()).collect();
    for name in &names {
        let _ = zf.compression_info(name);
        let _ = zf.read(name);
    }
});
