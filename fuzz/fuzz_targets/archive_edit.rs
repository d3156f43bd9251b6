//! Fuzz target for editing archives parsed from arbitrary bytes.
//!
//! Any archive that opens must stay readable after an entry is deleted, a
//! new one is added and the result is written back.
//!
//! Run with: cargo +nightly fuzz run archive_edit

#![no_main]

use libfuzzer_sys::fuzz_target;
use zfile::{MemoryStorage, ZFile, ZFileOptions};

fuzz_target!(|data: &[u8]| {
    let storage = MemoryStorage::from_vec(data.to_vec());
    let options = ZFileOptions::new().cover_empty_space_using_extra_field(true);
    let Ok(mut zf) = ZFile::open_storage(storage.clone(), options) else {
        return;
    };

    if let Some(first) = zf.entries().next().map(|e| e.name().to_string()) {
        let _ = zf.delete(&first);
    }
    if zf.add_bytes("fuzz.bin", data.iter().rev().copied().collect()).is_err() {
        return;
    }
    if zf.close().is_err() {
        return;
    }

    let reopened = ZFile::open_storage(storage, ZFileOptions::new())
        .expect("written archive must reopen");
    assert_eq!(
        reopened.read("fuzz.bin").expect("added entry must read back"),
        data.iter().rev().copied().collect::<Vec<u8>>()
    );
});
