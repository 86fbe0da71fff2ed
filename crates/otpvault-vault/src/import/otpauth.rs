//! Single-account `otpauth://totp/<label>?secret=...&issuer=...` URIs.

use super::{url_decode, AccountRecord, ImportError};

/// Parse one `otpauth://totp/` URI.
///
/// The label is the percent-decoded path. Of the query parameters only
/// `secret` (required) and `issuer` are read; when a key repeats, the
/// first value wins. The secret is kept exactly as supplied.
///
/// # Errors
///
/// - [`ImportError::InvalidFormat`] for another scheme or OTP type
/// - [`ImportError::Encoding`] for broken percent-encoding
/// - [`ImportError::MissingSecret`] if `secret` is absent or empty
pub fn parse_otpauth_uri(uri: &str) -> Result<AccountRecord, ImportError> {
    let (scheme, rest) = uri.split_once("://").ok_or_else(|| {
        ImportError::InvalidFormat("expected an otpauth://totp/ URI".to_string())
    })?;
    if !scheme.eq_ignore_ascii_case("otpauth") {
        return Err(ImportError::InvalidFormat(format!(
            "unsupported scheme '{scheme}', expected 'otpauth'"
        )));
    }

    let rest = rest.split_once('#').map_or(rest, |(before, _)| before);
    let (location, query) = rest.split_once('?').unwrap_or((rest, ""));
    let (otp_type, path) = location.split_once('/').unwrap_or((location, ""));
    if !otp_type.eq_ignore_ascii_case("totp") {
        return Err(ImportError::InvalidFormat(format!(
            "unsupported OTP type '{otp_type}', expected 'totp'"
        )));
    }

    let label = url_decode(path, false)
        .map_err(|e| ImportError::Encoding(format!("label: {e}")))?;

    let mut secret: Option<String> = None;
    let mut issuer: Option<String> = None;
    for pair in query.split('&').filter(|pair| !pair.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = url_decode(key, true).map_err(ImportError::Encoding)?;
        let slot = match key.as_str() {
            "secret" => &mut secret,
            "issuer" => &mut issuer,
            _ => continue,
        };
        if slot.is_none() {
            let value = url_decode(value, true)
                .map_err(|e| ImportError::Encoding(format!("{key}: {e}")))?;
            *slot = Some(value);
        }
    }

    let secret = secret
        .filter(|s| !s.is_empty())
        .ok_or(ImportError::MissingSecret)?;

    Ok(AccountRecord {
        secret,
        label,
        issuer: issuer.unwrap_or_default(),
    })
}
