//! Fuzz target for the migration-export decoder.
//!
//! Raw bytes go to the record extractor; valid UTF-8 also goes through
//! the full QR text entry point. Neither may panic.
//!
//! # Usage
//!
//! ```sh
//! cargo +nightly install cargo-fuzz
//!
//! cd crates/otpvault-vault
//! cargo +nightly fuzz run migration_import -- -max_len=4096
//! ```

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = otpvault_vault::import::google_auth::extract_records(data);

    if let Ok(text) = std::str::from_utf8(data) {
        let _ = otpvault_vault::parse_qr_data(text);
    }
});
