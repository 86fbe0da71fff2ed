//! RFC 6238 TOTP and RFC 4226 HOTP engine.
//!
//! Secrets enter the vault as Base32 text (the form authenticator URIs
//! and migration exports carry); [`decode_secret`] turns that text into
//! key bytes, and the generators run HMAC through `ring::hmac`.

use ring::hmac;
use zeroize::Zeroize;

use crate::CoreError;

// ── Constants ───────────────────────────────────────────────────────

/// Default TOTP period in seconds (RFC 6238 §4).
pub const DEFAULT_PERIOD: u32 = 30;

/// Accepted clock drift in time steps on either side of "now".
pub const TOTP_WINDOW: u64 = 1;

// ── Types ───────────────────────────────────────────────────────────

/// HMAC algorithm used for OTP generation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OtpAlgorithm {
    /// HMAC-SHA1, what nearly every issuer uses.
    #[default]
    Sha1,
    /// HMAC-SHA256.
    Sha256,
    /// HMAC-SHA512.
    Sha512,
}

impl OtpAlgorithm {
    fn hmac_algorithm(self) -> hmac::Algorithm {
        match self {
            Self::Sha1 => hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY,
            Self::Sha256 => hmac::HMAC_SHA256,
            Self::Sha512 => hmac::HMAC_SHA512,
        }
    }
}

/// Number of digits in an OTP code.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OtpDigits {
    /// 6-digit code.
    #[default]
    Six,
    /// 8-digit code.
    Eight,
}

impl OtpDigits {
    /// Numeric digit count.
    #[must_use]
    pub const fn value(self) -> u8 {
        match self {
            Self::Six => 6,
            Self::Eight => 8,
        }
    }

    const fn modulus(self) -> u32 {
        match self {
            Self::Six => 1_000_000,
            Self::Eight => 100_000_000,
        }
    }
}

/// Parameters shared by generation and validation.
///
/// The default (SHA1, 6 digits, 30 s) is what the vault uses for every
/// stored account, since neither the `otpauth://` form it accepts nor the
/// migration decoder carries anything else through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TotpParams {
    /// HMAC algorithm.
    pub algorithm: OtpAlgorithm,
    /// Output length.
    pub digits: OtpDigits,
    /// Time step in seconds. Must be non-zero.
    pub period: u32,
}

impl Default for TotpParams {
    fn default() -> Self {
        Self {
            algorithm: OtpAlgorithm::Sha1,
            digits: OtpDigits::Six,
            period: DEFAULT_PERIOD,
        }
    }
}

impl TotpParams {
    fn time_step(&self, time: u64) -> Result<u64, CoreError> {
        time.checked_div(u64::from(self.period))
            .ok_or_else(|| CoreError::Otp("period must be > 0".to_owned()))
    }
}

// ── Secrets ─────────────────────────────────────────────────────────

/// Decode a user-facing Base32 secret into key bytes.
///
/// Tolerates what people paste: embedded spaces, lowercase letters,
/// missing or present `=` padding, and non-zero bits in the last symbol.
///
/// # Errors
/// Returns [`CoreError::InvalidSecret`] if the secret is empty after
/// normalisation or is not valid Base32.
pub fn decode_secret(secret: &str) -> Result<Vec<u8>, CoreError> {
    let mut normalized: String = secret
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '=')
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if normalized.is_empty() {
        return Err(CoreError::InvalidSecret("secret is empty".to_owned()));
    }

    let decoded = lenient_base32().and_then(|base32| {
        base32
            .decode(normalized.as_bytes())
            .map_err(|e| CoreError::InvalidSecret(format!("not valid Base32: {e}")))
    });
    normalized.zeroize();
    decoded
}

/// RFC 4648 Base32 without padding that ignores non-zero trailing bits,
/// as typed-in secrets often have them.
fn lenient_base32() -> Result<data_encoding::Encoding, CoreError> {
    let mut spec = data_encoding::Specification::new();
    spec.symbols.push_str("ABCDEFGHIJKLMNOPQRSTUVWXYZ234567");
    spec.check_trailing_bits = false;
    spec.encoding().map_err(|e| CoreError::InvalidSecret(format!("Base32 alphabet: {e}")))
}

/// Encode raw key bytes as padded RFC 4648 Base32.
#[must_use]
pub fn encode_secret(key: &[u8]) -> String {
    data_encoding::BASE32.encode(key)
}

// ── HOTP (RFC 4226) ────────────────────────────────────────────────

/// Generate an HOTP code.
///
/// # Errors
/// Returns [`CoreError::Otp`] if the key is empty.
#[must_use = "OTP code should be used or stored"]
pub fn generate_hotp(
    key: &[u8],
    counter: u64,
    digits: OtpDigits,
    algorithm: OtpAlgorithm,
) -> Result<String, CoreError> {
    if key.is_empty() {
        return Err(CoreError::Otp("secret must not be empty".to_owned()));
    }

    let key = hmac::Key::new(algorithm.hmac_algorithm(), key);
    let tag = hmac::sign(&key, &counter.to_be_bytes());
    let mac = tag.as_ref();

    // Dynamic truncation (RFC 4226 §5.3). Every HMAC output here is at
    // least 20 bytes, so offset + 3 stays in bounds.
    let last = mac.last().copied().unwrap_or_default();
    let offset = usize::from(last & 0x0F);
    let window = mac
        .get(offset..offset.saturating_add(4))
        .ok_or_else(|| CoreError::Otp("HMAC output too short".to_owned()))?;
    let binary = u32::from_be_bytes([window[0] & 0x7F, window[1], window[2], window[3]]);

    #[allow(clippy::arithmetic_side_effects)]
    let code = binary % digits.modulus();
    let width = usize::from(digits.value());
    Ok(format!("{code:0>width$}"))
}

// ── TOTP (RFC 6238) ────────────────────────────────────────────────

/// Generate the TOTP code for `time` (Unix seconds).
///
/// # Errors
/// Returns [`CoreError::Otp`] if the period is 0 or the key is empty.
#[must_use = "OTP code should be used or stored"]
pub fn generate_totp(key: &[u8], time: u64, params: &TotpParams) -> Result<String, CoreError> {
    let step = params.time_step(time)?;
    generate_hotp(key, step, params.digits, params.algorithm)
}

/// Check `code` against the steps T-1, T and T+1 around `time`.
///
/// Every candidate in the window is computed and compared in constant
/// time, so a match does not return early.
///
/// # Errors
/// Returns [`CoreError::Otp`] if the period is 0 or the key is empty.
#[must_use = "validation result should be checked"]
pub fn validate_totp(
    key: &[u8],
    time: u64,
    code: &str,
    params: &TotpParams,
) -> Result<bool, CoreError> {
    let step = params.time_step(time)?;
    let first = step.saturating_sub(TOTP_WINDOW);
    let last = step.saturating_add(TOTP_WINDOW);

    let mut valid = false;
    for candidate in first..=last {
        let expected = generate_hotp(key, candidate, params.digits, params.algorithm)?;
        valid |= constant_time_eq(expected.as_bytes(), code.as_bytes());
    }
    Ok(valid)
}

/// Length leaks are fine: the digit count is public.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

// ── Tests ───────────────────────────────────────────────────────────
