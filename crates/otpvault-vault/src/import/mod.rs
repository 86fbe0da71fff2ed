//! QR / clipboard import for otpvault.
//!
//! Two input forms are accepted:
//! - `otpauth-migration://offline?data=...`: a batch export, decoded by
//!   [`google_auth`] on top of the [`wire`] walker
//! - `otpauth://totp/<label>?secret=...`: a single account, parsed by
//!   [`otpauth`]
//!
//! [`parse_qr_data`] picks the right parser; [`import_qr`] also stores the
//! result.

pub mod google_auth;
pub mod otpauth;
pub mod wire;

use serde::Serialize;

use crate::entries::CredentialStore;
use crate::error::VaultError;
use wire::WireError;

// ---------------------------------------------------------------------------
// Import error types
// ---------------------------------------------------------------------------

/// Fatal import failure. Per-entry problems are reported as
/// [`MalformedInfo`] instead.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// The text is not one of the accepted URI forms.
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// Percent-encoding or Base64 envelope is broken.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// The top level of the migration payload is structurally broken.
    #[error("corrupted payload: {0}")]
    Corrupted(#[from] WireError),

    /// An `otpauth://` URI without a `secret` parameter.
    #[error("URI has no secret parameter")]
    MissingSecret,

    /// Nothing importable was found.
    #[error("no valid accounts found ({malformed} malformed)")]
    NoRecordsFound {
        /// Entries that were present but rejected.
        malformed: usize,
    },
}

// ---------------------------------------------------------------------------
// Shared types
// ---------------------------------------------------------------------------

/// One account recovered from import data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRecord {
    /// Base32 secret.
    pub secret: String,
    /// Account name (e.g. "alice@example.com"). May be empty.
    pub label: String,
    /// Issuer (e.g. "GitHub"). May be empty.
    pub issuer: String,
}

impl AccountRecord {
    /// Label shown in the vault: `"<label> (<issuer>)"`, or just the label
    /// when there is no issuer.
    #[must_use]
    pub fn display_label(&self) -> String {
        if self.issuer.is_empty() {
            self.label.clone()
        } else {
            format!("{} ({})", self.label, self.issuer)
        }
    }
}

/// An entry that was present in the import data but not usable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MalformedInfo {
    /// Entry position in the migration payload.
    pub index: usize,
    /// Why it was skipped.
    pub reason: String,
}

/// Result of [`parse_qr_data`].
#[derive(Debug)]
pub struct ParsedImport {
    /// Usable records, in source order.
    pub records: Vec<AccountRecord>,
    /// Skipped entries, ordered by index.
    pub malformed: Vec<MalformedInfo>,
}

/// Summary of a completed [`import_qr`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    /// Number of accounts added.
    pub imported: usize,
    /// Ids assigned to the new accounts, in import order.
    pub imported_ids: Vec<String>,
    /// Entries that were skipped.
    pub malformed: Vec<MalformedInfo>,
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Parse scanned or pasted QR text into account records.
///
/// Migration exports may yield several records; a plain `otpauth://` URI
/// yields exactly one. Migration entries without a secret are moved to
/// `malformed`.
///
/// # Errors
///
/// Any fatal [`ImportError`], including [`ImportError::NoRecordsFound`]
/// when every migration entry was rejected.
pub fn parse_qr_data(text: &str) -> Result<ParsedImport, ImportError> {
    let text = text.trim();

    if !text.starts_with(google_auth::MIGRATION_PREFIX) {
        let record = otpauth::parse_otpauth_uri(text)?;
        return Ok(ParsedImport {
            records: vec![record],
            malformed: Vec::new(),
        });
    }

    let (indexed, mut malformed) = google_auth::parse_migration_uri(text)?.into_indexed();
    let mut records = Vec::with_capacity(indexed.len());
    for (index, record) in indexed {
        if record.secret.is_empty() {
            tracing::warn!(index, "skipping migration entry with empty secret");
            malformed.push(MalformedInfo {
                index,
                reason: "empty secret field".to_string(),
            });
        } else {
            records.push(record);
        }
    }
    malformed.sort_by_key(|info| info.index);

    if records.is_empty() {
        return Err(ImportError::NoRecordsFound {
            malformed: malformed.len(),
        });
    }

    tracing::info!(
        records = records.len(),
        malformed = malformed.len(),
        "parsed migration export"
    );
    Ok(ParsedImport { records, malformed })
}

/// Parse QR text and add every usable record to `store`, in order.
///
/// # Errors
///
/// Returns [`VaultError::Import`] if parsing fails (nothing is stored),
/// or [`VaultError::Storage`] if the store is unusable.
pub fn import_qr(store: &CredentialStore, text: &str) -> Result<ImportSummary, VaultError> {
    let parsed = parse_qr_data(text)?;

    let mut imported_ids = Vec::with_capacity(parsed.records.len());
    for record in &parsed.records {
        let credential = store.add(record)?;
        imported_ids.push(credential.id);
    }

    tracing::info!(imported = imported_ids.len(), "import complete");
    Ok(ImportSummary {
        imported: imported_ids.len(),
        imported_ids,
        malformed: parsed.malformed,
    })
}

// ---------------------------------------------------------------------------
// Percent-decoding
// ---------------------------------------------------------------------------

/// Percent-decode a URI component.
///
/// `%XX` sequences are decoded to raw bytes before UTF-8 validation, so
/// multi-byte characters work. With `plus_as_space`, `+` becomes a space
/// (query-string rules); otherwise it is kept (path rules).
pub(crate) fn url_decode(input: &str, plus_as_space: bool) -> Result<String, String> {
    let mut bytes = Vec::with_capacity(input.len());
    let mut iter = input.bytes();

    while let Some(b) = iter.next() {
        match b {
            b'%' => {
                let hi = iter
                    .next()
                    .ok_or_else(|| "incomplete percent-encoding".to_string())?;
                let lo = iter
                    .next()
                    .ok_or_else(|| "incomplete percent-encoding".to_string())?;
                bytes.push(hex_byte(hi, lo)?);
            }
            b'+' if plus_as_space => bytes.push(b' '),
            _ => bytes.push(b),
        }
    }

    String::from_utf8(bytes).map_err(|e| format!("invalid UTF-8 in URL-decoded data: {e}"))
}

#[allow(clippy::arithmetic_side_effects)]
fn hex_byte(hi: u8, lo: u8) -> Result<u8, String> {
    Ok((hex_nibble(hi)? << 4) | hex_nibble(lo)?)
}

#[allow(clippy::arithmetic_side_effects)]
fn hex_nibble(b: u8) -> Result<u8, String> {
    match b {
        b'0'..=b'9' => Ok(b - b'0'),
        b'a'..=b'f' => Ok(b - b'a' + 10),
        b'A'..=b'F' => Ok(b - b'A' + 10),
        _ => Err(format!("invalid hex character: {}", b as char)),
    }
}
