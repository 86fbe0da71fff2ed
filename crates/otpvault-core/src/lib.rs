//! `otpvault-core` — OTP engine for otpvault.
//!
//! Base32 secret handling plus RFC 4226 / RFC 6238 code generation and
//! validation. No I/O, no global state.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod error;

pub mod totp;

pub use error::CoreError;
pub use totp::{
    decode_secret, encode_secret, generate_hotp, generate_totp, validate_totp, OtpAlgorithm,
    OtpDigits, TotpParams, DEFAULT_PERIOD, TOTP_WINDOW,
};
