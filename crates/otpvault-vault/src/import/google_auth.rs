//! Authenticator migration export decoder.
//!
//! Parses `otpauth-migration://offline?data=<url-encoded-base64>` URIs.
//! The payload is walked field by field with [`super::wire`]: the outer
//! message is a list of field-1 sub-messages (one per account), and each
//! sub-message carries the secret (1), name (2) and issuer (3). Every
//! other field, at either level, is skipped.
//!
//! A sub-message that fails to decode is recorded and skipped; only a
//! structural failure of the outer message aborts the import.

use zeroize::Zeroize;

use super::wire::{self, DecodedField, FieldValue, WireError};
use super::{url_decode, AccountRecord, ImportError, MalformedInfo};

/// Scheme, host and query key every migration URI starts with.
pub const MIGRATION_PREFIX: &str = "otpauth-migration://offline?data=";

/// Outer message field holding one account sub-message.
const FIELD_OTP_PARAMETERS: u8 = 1;

/// Account sub-message fields.
const FIELD_SECRET: u8 = 1;
const FIELD_NAME: u8 = 2;
const FIELD_ISSUER: u8 = 3;

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Accounts recovered from a migration payload.
#[derive(Debug, Default)]
pub struct Extraction {
    /// Decoded accounts, in payload order.
    records: Vec<AccountRecord>,
    /// Entry index of each record, parallel to `records`.
    indices: Vec<usize>,
    /// Sub-messages that could not be decoded.
    pub malformed: Vec<MalformedInfo>,
}

impl Extraction {
    /// Decoded accounts, in payload order.
    #[must_use]
    pub fn records(&self) -> &[AccountRecord] {
        &self.records
    }

    fn push(&mut self, index: usize, record: AccountRecord) {
        self.records.push(record);
        self.indices.push(index);
    }

    /// Split into `(entry index, record)` pairs and the malformed list.
    #[must_use]
    pub fn into_indexed(self) -> (Vec<(usize, AccountRecord)>, Vec<MalformedInfo>) {
        (
            self.indices.into_iter().zip(self.records).collect(),
            self.malformed,
        )
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parse a full migration URI.
///
/// # Errors
///
/// - [`ImportError::InvalidFormat`] if the URI does not start with
///   [`MIGRATION_PREFIX`]
/// - [`ImportError::Encoding`] if URL-decoding or Base64-decoding fails
/// - anything [`extract_records`] returns
pub fn parse_migration_uri(uri: &str) -> Result<Extraction, ImportError> {
    let data = uri.strip_prefix(MIGRATION_PREFIX).ok_or_else(|| {
        ImportError::InvalidFormat(format!("expected URI starting with '{MIGRATION_PREFIX}'"))
    })?;

    let mut encoded = url_decode(data, true)
        .map_err(|e| ImportError::Encoding(format!("URL decode failed: {e}")))?;

    let decoded = data_encoding::BASE64
        .decode(encoded.as_bytes())
        .map_err(|e| ImportError::Encoding(format!("Base64 decode failed: {e}")));
    encoded.zeroize();
    let mut bytes = decoded?;

    let result = extract_records(&bytes);
    bytes.zeroize();
    result
}

/// Decode the raw migration payload into account records.
///
/// # Errors
///
/// - [`ImportError::Corrupted`] if the outer message is structurally
///   broken (bad tag, length or wire type at the top level)
/// - [`ImportError::NoRecordsFound`] if the walk succeeds but no account
///   sub-message decodes
pub fn extract_records(bytes: &[u8]) -> Result<Extraction, ImportError> {
    let mut extraction = Extraction::default();
    let mut index = 0usize;

    wire::for_each_field(bytes, |field| {
        let Some(sub_message) = account_payload(&field) else {
            tracing::debug!(
                field = field.field_number,
                wire_type = field.wire_type().bits(),
                "skipping top-level migration field"
            );
            return;
        };

        match parse_account(sub_message) {
            Ok(record) => {
                extraction.push(index, record);
            }
            Err(err) => {
                tracing::warn!(index, error = %err, "skipping undecodable migration entry");
                extraction.malformed.push(MalformedInfo {
                    index,
                    reason: err.to_string(),
                });
            }
        }
        index = index.saturating_add(1);
    })?;

    if extraction.records.is_empty() {
        return Err(ImportError::NoRecordsFound {
            malformed: extraction.malformed.len(),
        });
    }
    Ok(extraction)
}

/// Decode one account sub-message.
///
/// The secret is re-encoded as padded Base32; name and issuer are read as
/// UTF-8, with invalid sequences replaced. Empty values are kept: whether
/// a record is usable is up to the caller.
///
/// # Errors
///
/// Returns the [`WireError`] that stopped the walk of this sub-message.
pub fn parse_account(bytes: &[u8]) -> Result<AccountRecord, WireError> {
    let mut record = AccountRecord::default();

    wire::for_each_field(bytes, |field| match (field.field_number, field.value) {
        (FIELD_SECRET, FieldValue::LengthDelimited(secret)) => {
            record.secret = otpvault_core::encode_secret(secret);
        }
        (FIELD_NAME, FieldValue::LengthDelimited(name)) => {
            record.label = String::from_utf8_lossy(name).into_owned();
        }
        (FIELD_ISSUER, FieldValue::LengthDelimited(issuer)) => {
            record.issuer = String::from_utf8_lossy(issuer).into_owned();
        }
        _ => {}
    })?;

    Ok(record)
}

fn account_payload<'a>(field: &DecodedField<'a>) -> Option<&'a [u8]> {
    if field.field_number == FIELD_OTP_PARAMETERS {
        field.bytes()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Length-delimited field with a one-byte length.
    fn ld(field: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![(field << 3) | 2, u8::try_from(payload.len()).unwrap()];
        out.extend_from_slice(payload);
        out
    }

    fn account(secret: &[u8], name: &str, issuer: &str) -> Vec<u8> {
        let mut out = ld(FIELD_SECRET, secret);
        out.extend(ld(FIELD_NAME, name.as_bytes()));
        out.extend(ld(FIELD_ISSUER, issuer.as_bytes()));
        out
    }

    fn migration_uri(payload: &[u8]) -> String {
        let b64 = data_encoding::BASE64.encode(payload);
        let escaped = b64
            .replace('+', "%2B")
            .replace('/', "%2F")
            .replace('=', "%3D");
        format!("{MIGRATION_PREFIX}{escaped}")
    }

    #[test]
    fn parse_account_reads_known_fields() {
        let record = parse_account(&account(b"Hello!", "alice@example.com", "Example")).unwrap();
        assert_eq!(record.secret, "JBSWY3DPEE======");
        assert_eq!(record.label, "alice@example.com");
        assert_eq!(record.issuer, "Example");
    }

    #[test]
    fn parse_account_skips_every_other_field() {
        let mut bytes = vec![0x20, 0x01]; // algorithm = SHA1
        bytes.extend(account(b"key", "bob", ""));
        bytes.extend([0x28, 0x01]); // digits
        bytes.extend([0x38, 0xAC, 0x02]); // counter = 300
        bytes.extend([0x41, 1, 2, 3, 4, 5, 6, 7, 8]); // field 8, fixed64
        bytes.extend([0x4D, 1, 2, 3, 4]); // field 9, fixed32
        bytes.extend(ld(10, b"future"));
        bytes.extend([0x10, 0x05]); // field 2 as varint is not a name

        let record = parse_account(&bytes).unwrap();
        assert_eq!(record.secret, otpvault_core::encode_secret(b"key"));
        assert_eq!(record.label, "bob");
        assert_eq!(record.issuer, "");
    }

    #[test]
    fn parse_account_last_value_wins() {
        let mut bytes = ld(FIELD_NAME, b"first");
        bytes.extend(ld(FIELD_NAME, b"second"));
        assert_eq!(parse_account(&bytes).unwrap().label, "second");
    }

    #[test]
    fn parse_account_replaces_invalid_utf8() {
        let record = parse_account(&ld(FIELD_NAME, &[b'a', 0xFF, b'b'])).unwrap();
        assert_eq!(record.label, "a\u{FFFD}b");
    }

    #[test]
    fn parse_account_propagates_structural_errors() {
        assert_eq!(
            parse_account(&[0x0A, 0x10, 0x00]),
            Err(WireError::InvalidLength {
                offset: 1,
                length: 16,
                remaining: 1
            })
        );
    }

    #[test]
    fn extract_records_keeps_payload_order() {
        let mut payload = ld(1, &account(b"one", "first", ""));
        payload.extend([0x10, 0x01]); // version
        payload.extend(ld(1, &account(b"two", "second", "Issuer")));
        payload.extend([0x18, 0x01, 0x20, 0x00, 0x28, 0x7B]); // batch fields

        let extraction = extract_records(&payload).unwrap();
        let labels: Vec<&str> = extraction
            .records()
            .iter()
            .map(|r| r.label.as_str())
            .collect();
        assert_eq!(labels, vec!["first", "second"]);
        assert!(extraction.malformed.is_empty());
    }

    #[test]
    fn extract_records_tolerates_one_bad_entry() {
        let mut payload = ld(1, &account(b"good", "ok", ""));
        payload.extend(ld(1, &[0x0A, 0x7F, 0x00])); // inner length past end
        payload.extend(ld(1, &account(b"also-good", "ok2", "")));

        let extraction = extract_records(&payload).unwrap();
        assert_eq!(extraction.records().len(), 2);
        assert_eq!(extraction.malformed.len(), 1);
        assert_eq!(extraction.malformed[0].index, 1);
        assert!(extraction.malformed[0].reason.contains("declares 127 bytes"));

        let (indexed, _) = extraction.into_indexed();
        let pairs: Vec<(usize, &str)> = indexed
            .iter()
            .map(|(i, record)| (*i, record.label.as_str()))
            .collect();
        assert_eq!(pairs, vec![(0, "ok"), (2, "ok2")]);
    }

    #[test]
    fn extract_records_top_level_error_is_fatal() {
        let mut payload = ld(1, &account(b"good", "ok", ""));
        payload.extend([0x0A, 0x40, 0x00]);

        match extract_records(&payload) {
            Err(ImportError::Corrupted(WireError::InvalidLength { length: 64, .. })) => {}
            other => panic!("expected Corrupted(InvalidLength), got {other:?}"),
        }
    }

    #[test]
    fn extract_records_unknown_top_level_wire_type_is_fatal() {
        let mut payload = ld(1, &account(b"good", "ok", ""));
        payload.push(0x0F); // field 1, wire type 7
        assert!(matches!(
            extract_records(&payload),
            Err(ImportError::Corrupted(WireError::UnknownWireType {
                wire_type: 7,
                ..
            }))
        ));
    }

    #[test]
    fn extract_records_skips_fixed_width_top_level_fields() {
        let mut payload = vec![0x11, 0, 0, 0, 0, 0, 0, 0, 0]; // field 2, fixed64
        payload.extend(ld(1, &account(b"k", "n", "")));
        payload.extend([0x1D, 0, 0, 0, 0]); // field 3, fixed32
        assert_eq!(extract_records(&payload).unwrap().records().len(), 1);
    }

    #[test]
    fn extract_records_empty_payload_has_no_records() {
        assert!(matches!(
            extract_records(&[]),
            Err(ImportError::NoRecordsFound { malformed: 0 })
        ));
        assert!(matches!(
            extract_records(&[0x10, 0x01]),
            Err(ImportError::NoRecordsFound { malformed: 0 })
        ));
    }

    #[test]
    fn extract_records_only_bad_entries() {
        let payload = ld(1, &[0x0B]);
        assert!(matches!(
            extract_records(&payload),
            Err(ImportError::NoRecordsFound { malformed: 1 })
        ));
    }

    #[test]
    fn extract_records_keeps_empty_secret() {
        // One entry whose only field is an empty name.
        let extraction = extract_records(&[0x0A, 0x02, 0x12, 0x00]).unwrap();
        assert_eq!(extraction.records().len(), 1);
        assert!(extraction.records()[0].secret.is_empty());
    }

    #[test]
    fn parse_migration_uri_roundtrip() {
        let payload = ld(1, &account(b"roundtrip-secret", "user", "Test"));
        let extraction = parse_migration_uri(&migration_uri(&payload)).unwrap();
        assert_eq!(extraction.records().len(), 1);
        let record = &extraction.records()[0];
        assert_eq!(record.label, "user");
        assert_eq!(record.issuer, "Test");
        assert_eq!(
            otpvault_core::decode_secret(&record.secret).unwrap(),
            b"roundtrip-secret"
        );
    }

    #[test]
    fn parse_migration_uri_wrong_scheme() {
        match parse_migration_uri("https://example.com/?data=abc") {
            Err(ImportError::InvalidFormat(msg)) => assert!(msg.contains("otpauth-migration")),
            other => panic!("expected InvalidFormat, got {other:?}"),
        }
    }

    #[test]
    fn parse_migration_uri_bad_percent_encoding() {
        match parse_migration_uri(&format!("{MIGRATION_PREFIX}abc%2")) {
            Err(ImportError::Encoding(msg)) => assert!(msg.contains("URL decode")),
            other => panic!("expected Encoding, got {other:?}"),
        }
    }

    #[test]
    fn parse_migration_uri_bad_base64() {
        match parse_migration_uri(&format!("{MIGRATION_PREFIX}not-valid-b64!!!")) {
            Err(ImportError::Encoding(msg)) => assert!(msg.contains("Base64")),
            other => panic!("expected Encoding, got {other:?}"),
        }
    }

    #[test]
    fn parse_migration_uri_unpadded_base64_is_rejected() {
        // "CgA" is the unpadded form of [0x0A, 0x00]; the standard
        // alphabet requires padding.
        assert!(matches!(
            parse_migration_uri(&format!("{MIGRATION_PREFIX}CgA")),
            Err(ImportError::Encoding(_))
        ));
    }
}
