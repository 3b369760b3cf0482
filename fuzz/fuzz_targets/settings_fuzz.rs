//! Fuzz test for TOML settings loading
//!
//! `CacheSettings::from_toml_str` must reject bad input with a `ConfigError`
//! rather than panicking, and whatever it accepts must validate.
//!
//! Run with: cargo +nightly fuzz run settings_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use recall_core::CacheSettings;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        if let Ok(settings) = CacheSettings::from_toml_str(input) {
            assert!(settings.validate().is_ok(), "Loaded settings failed validation");
            for (prefix, target) in &settings.targets {
                assert!(!prefix.trim().is_empty());
                let _ = target.lifespan();
            }
        }
    }
});
