#![no_main]

use libfuzzer_sys::fuzz_target;
use schoolhub_core::core_access::SessionCodec;
use schoolhub_core::core_store::Timestamp;
use std::time::Duration;

fuzz_target!(|data: &[u8]| {
    let codec = SessionCodec::new(Duration::from_secs(3600));
    if let Ok(token) = std::str::from_utf8(data) {
        // Malformed tokens must be rejected, never panic
        let _ = codec.verify(token, Timestamp::from_millis(0));
    }
});
