#![no_main]

use libfuzzer_sys::fuzz_target;
use schoolhub_core::core_store::{RecordStore, StoreSnapshot};

fuzz_target!(|data: &[u8]| {
    // Cache files and remote answers are untrusted input
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(snapshot) = StoreSnapshot::from_serialized(text) {
            // Whatever loads must serialize again
            let store = RecordStore::from_snapshot(snapshot);
            assert!(store.to_serialized().is_ok());
        }
    }
});
