//! Tag-length-value stream walker for migration payloads.
//!
//! The migration export is a protobuf message, but there is no schema to
//! compile against: the walker decodes one field at a time from nothing
//! but the tag byte, and callers decide what each field number means.
//! Only the wire types the format uses are understood (varint, fixed64,
//! length-delimited, fixed32); group wire types are treated as corruption.
//!
//! Every read is bounds-checked against the slice before it happens, and
//! every successful step advances the cursor by at least two bytes, so a
//! walk over `n` bytes finishes in at most `n / 2` steps.

use std::iter::FusedIterator;

use thiserror::Error;

/// Longest varint that still fits in a `u64`.
pub const MAX_VARINT_LEN: usize = 10;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// How the bytes following a tag are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    /// Base-128 variable-length integer (wire type 0).
    Varint,
    /// Eight little-endian bytes (wire type 1).
    Fixed64,
    /// Varint length followed by that many bytes (wire type 2).
    LengthDelimited,
    /// Four little-endian bytes (wire type 5).
    Fixed32,
}

impl WireType {
    /// Map the low three bits of a tag to a wire type.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Self::Varint),
            1 => Some(Self::Fixed64),
            2 => Some(Self::LengthDelimited),
            5 => Some(Self::Fixed32),
            _ => None,
        }
    }

    /// The on-wire value of this wire type.
    #[must_use]
    pub const fn bits(self) -> u8 {
        match self {
            Self::Varint => 0,
            Self::Fixed64 => 1,
            Self::LengthDelimited => 2,
            Self::Fixed32 => 5,
        }
    }
}

/// A decoded field payload. Length-delimited values borrow from the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue<'a> {
    Varint(u64),
    Fixed64(u64),
    LengthDelimited(&'a [u8]),
    Fixed32(u32),
}

impl FieldValue<'_> {
    /// Wire type this value was decoded from.
    #[must_use]
    pub const fn wire_type(&self) -> WireType {
        match self {
            Self::Varint(_) => WireType::Varint,
            Self::Fixed64(_) => WireType::Fixed64,
            Self::LengthDelimited(_) => WireType::LengthDelimited,
            Self::Fixed32(_) => WireType::Fixed32,
        }
    }
}

/// One field produced by [`step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedField<'a> {
    /// Field number from the tag (`tag >> 3`).
    pub field_number: u8,
    /// Decoded payload.
    pub value: FieldValue<'a>,
    /// Bytes consumed, tag included. Always at least 2.
    pub consumed: usize,
}

impl<'a> DecodedField<'a> {
    #[must_use]
    pub const fn wire_type(&self) -> WireType {
        self.value.wire_type()
    }

    /// The payload bytes if this is a length-delimited field.
    #[must_use]
    pub const fn bytes(&self) -> Option<&'a [u8]> {
        match self.value {
            FieldValue::LengthDelimited(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// Structural decode failure. `offset` is the byte position in the buffer
/// being walked where the failing element starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("truncated tag at offset {offset}")]
    TruncatedTag { offset: usize },

    #[error("varint at offset {offset} is longer than {MAX_VARINT_LEN} bytes")]
    VarintOverflow { offset: usize },

    #[error("truncated varint at offset {offset}")]
    TruncatedVarint { offset: usize },

    #[error("truncated 64-bit field at offset {offset}")]
    TruncatedFixed64 { offset: usize },

    #[error(
        "length-delimited field at offset {offset} declares {length} bytes \
         but only {remaining} remain"
    )]
    InvalidLength {
        offset: usize,
        length: u64,
        remaining: usize,
    },

    #[error("truncated 32-bit field at offset {offset}")]
    TruncatedFixed32 { offset: usize },

    #[error("unknown wire type {wire_type} at offset {offset}")]
    UnknownWireType { offset: usize, wire_type: u8 },
}

impl WireError {
    /// Byte offset the error refers to.
    #[must_use]
    pub const fn offset(&self) -> usize {
        match *self {
            Self::TruncatedTag { offset }
            | Self::VarintOverflow { offset }
            | Self::TruncatedVarint { offset }
            | Self::TruncatedFixed64 { offset }
            | Self::InvalidLength { offset, .. }
            | Self::TruncatedFixed32 { offset }
            | Self::UnknownWireType { offset, .. } => offset,
        }
    }
}

// ---------------------------------------------------------------------------
// Walker
// ---------------------------------------------------------------------------

/// Decode the field starting at `cursor`.
///
/// Returns the field and the cursor position just past it.
///
/// The tag is always one byte: field number `byte >> 3`, wire type
/// `byte & 7`. Multi-byte (varint) tags, which encoders emit for field
/// numbers of 16 and up, are not supported; a byte of `0x80` or more is
/// read as a field number from 16 to 31, and the bytes that follow are
/// then misread.
///
/// # Errors
///
/// Returns a [`WireError`] if the tag, the value, or a declared length
/// does not fit in `buf`, or if the tag names an unsupported wire type.
pub fn step(buf: &[u8], cursor: usize) -> Result<(DecodedField<'_>, usize), WireError> {
    let tag = *buf
        .get(cursor)
        .ok_or(WireError::TruncatedTag { offset: cursor })?;
    let field_number = tag >> 3;
    let wire_bits = tag & 0x07;
    // cursor indexes a byte, so cursor + 1 <= buf.len().
    let start = cursor.saturating_add(1);

    let (value, end) = match WireType::from_bits(wire_bits) {
        Some(WireType::Varint) => {
            let (value, end) = read_varint(buf, start)?;
            (FieldValue::Varint(value), end)
        }
        Some(WireType::Fixed64) => {
            let (bytes, end) =
                read_fixed::<8>(buf, start).ok_or(WireError::TruncatedFixed64 { offset: start })?;
            (FieldValue::Fixed64(u64::from_le_bytes(bytes)), end)
        }
        Some(WireType::LengthDelimited) => {
            let (length, data_start) = read_varint(buf, start)?;
            let remaining = buf.len().saturating_sub(data_start);
            let data = usize::try_from(length)
                .ok()
                .filter(|len| *len <= remaining)
                .and_then(|len| buf.get(data_start..data_start.checked_add(len)?))
                .ok_or(WireError::InvalidLength {
                    offset: start,
                    length,
                    remaining,
                })?;
            // data_start + data.len() <= buf.len(), checked above.
            (
                FieldValue::LengthDelimited(data),
                data_start.saturating_add(data.len()),
            )
        }
        Some(WireType::Fixed32) => {
            let (bytes, end) =
                read_fixed::<4>(buf, start).ok_or(WireError::TruncatedFixed32 { offset: start })?;
            (FieldValue::Fixed32(u32::from_le_bytes(bytes)), end)
        }
        None => {
            return Err(WireError::UnknownWireType {
                offset: cursor,
                wire_type: wire_bits,
            })
        }
    };

    let field = DecodedField {
        field_number,
        value,
        consumed: end.saturating_sub(cursor),
    };
    Ok((field, end))
}

/// Decode a base-128 varint starting at `start`.
///
/// Returns the value and the position after its last byte.
#[allow(clippy::arithmetic_side_effects)]
fn read_varint(buf: &[u8], start: usize) -> Result<(u64, usize), WireError> {
    let tail = buf.get(start..).unwrap_or_default();
    let mut value = 0u64;

    // i < MAX_VARINT_LEN, so the shift stays <= 63.
    for (i, &byte) in tail.iter().take(MAX_VARINT_LEN).enumerate() {
        if i == MAX_VARINT_LEN - 1 && byte > 1 {
            // Continuation on the 10th byte, or bits past 2^64.
            return Err(WireError::VarintOverflow { offset: start });
        }
        value |= u64::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, start + i + 1));
        }
    }

    if tail.len() >= MAX_VARINT_LEN {
        Err(WireError::VarintOverflow { offset: start })
    } else {
        Err(WireError::TruncatedVarint { offset: start })
    }
}

/// Read exactly `N` bytes at `start`, or `None` if fewer remain.
fn read_fixed<const N: usize>(buf: &[u8], start: usize) -> Option<([u8; N], usize)> {
    let end = start.checked_add(N)?;
    let bytes = buf.get(start..end)?.try_into().ok()?;
    Some((bytes, end))
}

// ---------------------------------------------------------------------------
// Field sequence
// ---------------------------------------------------------------------------

/// Lazy sequence of the fields in a buffer.
///
/// Yields each field in order until the buffer is exhausted. The first
/// structural error is yielded once and ends the sequence.
#[derive(Debug, Clone)]
pub struct Fields<'a> {
    buf: &'a [u8],
    cursor: usize,
    failed: bool,
}

impl Fields<'_> {
    /// Current read position.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.cursor
    }
}

impl<'a> Iterator for Fields<'a> {
    type Item = Result<DecodedField<'a>, WireError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.cursor >= self.buf.len() {
            return None;
        }
        match step(self.buf, self.cursor) {
            Ok((field, next)) => {
                self.cursor = next;
                Some(Ok(field))
            }
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

impl FusedIterator for Fields<'_> {}

/// Walk every field in `buf`.
#[must_use]
pub const fn fields(buf: &[u8]) -> Fields<'_> {
    Fields {
        buf,
        cursor: 0,
        failed: false,
    }
}

/// Feed every field in `buf` to `on_field`, stopping at the first
/// structural error.
///
/// # Errors
///
/// Returns the first [`WireError`] encountered. Fields before it have
/// already been passed to `on_field`.
pub fn for_each_field<'a, F>(buf: &'a [u8], mut on_field: F) -> Result<(), WireError>
where
    F: FnMut(DecodedField<'a>),
{
    for field in fields(buf) {
        on_field(field?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(buf: &[u8]) -> Result<(DecodedField<'_>, usize), WireError> {
        step(buf, 0)
    }

    #[test]
    fn tag_splits_field_number_and_wire_type() {
        let (field, next) = single(&[0x18, 0x07]).unwrap();
        assert_eq!(field.field_number, 3);
        assert_eq!(field.wire_type(), WireType::Varint);
        assert_eq!(field.value, FieldValue::Varint(7));
        assert_eq!(field.consumed, 2);
        assert_eq!(next, 2);
    }

    #[test]
    fn tag_is_a_single_byte() {
        // An encoder writes field 16 as the two-byte tag 0x80 0x01; read
        // one byte at a time it becomes field 16, varint 1.
        let (field, next) = single(&[0x80, 0x01, 0x05]).unwrap();
        assert_eq!(field.field_number, 16);
        assert_eq!(field.value, FieldValue::Varint(1));
        assert_eq!(next, 2);

        let (field, _) = single(&[0xFA, 0x00]).unwrap();
        assert_eq!(field.field_number, 31);
        assert_eq!(field.wire_type(), WireType::LengthDelimited);
    }

    #[test]
    fn multi_byte_varint() {
        let (field, next) = single(&[0x08, 0xAC, 0x02]).unwrap();
        assert_eq!(field.value, FieldValue::Varint(300));
        assert_eq!(next, 3);
    }

    #[test]
    fn ten_byte_varint_is_u64_max() {
        let mut buf = vec![0x08];
        buf.extend_from_slice(&[0xFF; 9]);
        buf.push(0x01);
        let (field, next) = single(&buf).unwrap();
        assert_eq!(field.value, FieldValue::Varint(u64::MAX));
        assert_eq!(next, 11);
    }

    #[test]
    fn varint_longer_than_ten_bytes_overflows() {
        let mut buf = vec![0x08];
        buf.extend_from_slice(&[0x80; 10]);
        buf.push(0x00);
        assert_eq!(single(&buf), Err(WireError::VarintOverflow { offset: 1 }));
    }

    #[test]
    fn tenth_byte_with_high_bits_overflows() {
        let mut buf = vec![0x08];
        buf.extend_from_slice(&[0xFF; 9]);
        buf.push(0x02);
        assert_eq!(single(&buf), Err(WireError::VarintOverflow { offset: 1 }));
    }

    #[test]
    fn varint_running_off_the_end_is_truncated() {
        assert_eq!(
            single(&[0x08, 0x80, 0x80]),
            Err(WireError::TruncatedVarint { offset: 1 })
        );
        assert_eq!(single(&[0x08]), Err(WireError::TruncatedVarint { offset: 1 }));
    }

    #[test]
    fn fixed_width_values_are_little_endian() {
        let (field, next) = single(&[0x09, 1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        assert_eq!(field.value, FieldValue::Fixed64(0x0807_0605_0403_0201));
        assert_eq!(next, 9);

        let (field, next) = single(&[0x15, 0x78, 0x56, 0x34, 0x12]).unwrap();
        assert_eq!(field.field_number, 2);
        assert_eq!(field.value, FieldValue::Fixed32(0x1234_5678));
        assert_eq!(next, 5);
    }

    #[test]
    fn fixed_width_values_truncated() {
        assert_eq!(
            single(&[0x09, 1, 2, 3, 4, 5, 6, 7]),
            Err(WireError::TruncatedFixed64 { offset: 1 })
        );
        assert_eq!(
            single(&[0x0D, 1, 2, 3]),
            Err(WireError::TruncatedFixed32 { offset: 1 })
        );
    }

    #[test]
    fn length_delimited_borrows_payload() {
        let buf = [0x12, 0x03, b'a', b'b', b'c', 0xFF];
        let (field, next) = single(&buf).unwrap();
        assert_eq!(field.field_number, 2);
        assert_eq!(field.bytes(), Some(&b"abc"[..]));
        assert_eq!(next, 5);
    }

    #[test]
    fn empty_length_delimited() {
        let (field, next) = single(&[0x0A, 0x00]).unwrap();
        assert_eq!(field.bytes(), Some(&[][..]));
        assert_eq!(next, 2);
    }

    #[test]
    fn declared_length_past_end_is_rejected() {
        assert_eq!(
            single(&[0x0A, 0x05, 1, 2]),
            Err(WireError::InvalidLength {
                offset: 1,
                length: 5,
                remaining: 2
            })
        );
    }

    #[test]
    fn huge_declared_length_does_not_overflow() {
        let mut buf = vec![0x0A];
        buf.extend_from_slice(&[0xFF; 9]);
        buf.push(0x01);
        buf.push(0x00);
        assert_eq!(
            single(&buf),
            Err(WireError::InvalidLength {
                offset: 1,
                length: u64::MAX,
                remaining: 1
            })
        );
    }

    #[test]
    fn group_and_reserved_wire_types_are_rejected() {
        for wire_type in [3u8, 4, 6, 7] {
            let tag = (1 << 3) | wire_type;
            assert_eq!(
                single(&[tag, 0, 0, 0, 0, 0, 0, 0, 0]),
                Err(WireError::UnknownWireType {
                    offset: 0,
                    wire_type
                })
            );
        }
    }

    #[test]
    fn step_past_end_is_truncated_tag() {
        assert_eq!(step(&[], 0), Err(WireError::TruncatedTag { offset: 0 }));
        assert_eq!(step(&[0x08, 0x01], 2), Err(WireError::TruncatedTag { offset: 2 }));
        assert_eq!(step(&[0x08, 0x01], 99), Err(WireError::TruncatedTag { offset: 99 }));
    }

    #[test]
    fn step_from_middle_reports_absolute_offsets() {
        let buf = [0x08, 0x01, 0x0A, 0x09, 0x00];
        let (_, next) = step(&buf, 0).unwrap();
        assert_eq!(
            step(&buf, next),
            Err(WireError::InvalidLength {
                offset: 3,
                length: 9,
                remaining: 1
            })
        );
    }

    #[test]
    fn fields_walks_to_the_end_in_order() {
        let buf = [0x08, 0x01, 0x12, 0x01, b'x', 0x1D, 0, 0, 0, 0];
        let numbers: Vec<u8> = fields(&buf).map(|f| f.unwrap().field_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn fields_stops_after_first_error() {
        let buf = [0x08, 0x01, 0x0B, 0x08, 0x01];
        let mut iter = fields(&buf);
        assert!(iter.next().unwrap().is_ok());
        assert_eq!(
            iter.next(),
            Some(Err(WireError::UnknownWireType {
                offset: 2,
                wire_type: 3
            }))
        );
        assert_eq!(iter.next(), None);
        assert_eq!(iter.next(), None);
        assert_eq!(iter.position(), 2);
    }

    #[test]
    fn fields_cursor_never_moves_backwards() {
        let buf = [0x08, 0x96, 0x01, 0x12, 0x00, 0x19, 0, 0, 0, 0, 0, 0, 0, 0];
        let mut iter = fields(&buf);
        let mut last = iter.position();
        while let Some(field) = iter.next() {
            let field = field.unwrap();
            assert!(iter.position() > last);
            assert_eq!(iter.position() - last, field.consumed);
            last = iter.position();
        }
        assert_eq!(last, buf.len());
    }

    #[test]
    fn for_each_field_passes_fields_before_error() {
        let buf = [0x08, 0x01, 0x10, 0x02, 0x1A, 0x05];
        let mut seen = Vec::new();
        let result = for_each_field(&buf, |field| seen.push(field.field_number));
        assert_eq!(seen, vec![1, 2]);
        assert_eq!(
            result,
            Err(WireError::InvalidLength {
                offset: 5,
                length: 5,
                remaining: 0
            })
        );
    }

    #[test]
    fn wire_type_bits_roundtrip() {
        for wire_type in [
            WireType::Varint,
            WireType::Fixed64,
            WireType::LengthDelimited,
            WireType::Fixed32,
        ] {
            assert_eq!(WireType::from_bits(wire_type.bits()), Some(wire_type));
        }
    }
}
