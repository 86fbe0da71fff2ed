//! `otpauth://` export for a single account, e.g. to render as a QR code.

use crate::entries::Credential;

/// Build `otpauth://totp/<user_info>?secret=<secret>&issuer=<issuer>`.
///
/// `user_info` is path-escaped (space as `%20`) and `issuer` is
/// query-escaped (space as `+`), so both read back unchanged through
/// [`crate::import::otpauth::parse_otpauth_uri`]. The secret is Base32 and
/// written as stored.
#[must_use]
pub fn export_uri(credential: &Credential, issuer: &str) -> String {
    format!(
        "otpauth://totp/{}?secret={}&issuer={}",
        path_escape(&credential.user_info),
        credential.secret,
        query_escape(issuer)
    )
}

/// Form-style escaping: ASCII alphanumerics and `-_.~` are kept, space
/// becomes `+`, every other byte becomes `%XX`.
#[must_use]
pub fn query_escape(input: &str) -> String {
    escape(input, true)
}

/// Path-segment escaping: as [`query_escape`], but space becomes `%20`.
#[must_use]
pub fn path_escape(input: &str) -> String {
    escape(input, false)
}

fn escape(input: &str, space_as_plus: bool) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";

    let mut out = String::with_capacity(input.len());
    for &b in input.as_bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(char::from(b));
            }
            b' ' if space_as_plus => out.push('+'),
            _ => {
                out.push('%');
                out.push(char::from(HEX[usize::from(b >> 4)]));
                out.push(char::from(HEX[usize::from(b & 0x0F)]));
            }
        }
    }
    out
}
