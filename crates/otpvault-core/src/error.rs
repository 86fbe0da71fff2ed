//! Error types for `otpvault-core`.

use thiserror::Error;

/// Errors produced by the OTP engine.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// The shared secret is not valid Base32 (RFC 4648).
    #[error("invalid secret: {0}")]
    InvalidSecret(String),

    /// TOTP/HOTP generation or validation error.
    #[error("OTP error: {0}")]
    Otp(String),
}
