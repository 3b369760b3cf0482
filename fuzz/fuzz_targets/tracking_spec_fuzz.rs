//! Fuzz test for change-tracking spec parsing
//!
//! Feeds arbitrary UTF-8 to `ChangeTrackingSpec::parse`. Parsing must never
//! panic, and any accepted spec must survive a render/parse cycle.
//!
//! Run with: cargo +nightly fuzz run tracking_spec_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use recall_core::ChangeTrackingSpec;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        if let Ok(spec) = ChangeTrackingSpec::parse(input) {
            let rendered = spec.to_string();
            let reparsed = ChangeTrackingSpec::parse(&rendered)
                .expect("rendered spec should parse");
            assert_eq!(reparsed, spec, "Render/parse cycle changed the spec");

            // Every target yields a non-empty entity token
            for target in spec.targets() {
                assert!(!target.entity_token().as_str().is_empty());
            }
        }
    }
});
