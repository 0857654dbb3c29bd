//! Minimal-form unsigned varints.
//!
//! The protocol's only variable-width integer encoding: seven value bits
//! per byte, low group first, high bit set on every byte except the last.
//! Frame length prefixes, header identifiers, and length-prefixed strings
//! all use it. Encoding always emits the minimal form; decoding accepts any
//! well-formed input but rejects encodings that overflow 64 bits.

use crate::errors::{ProtocolError, Result};

/// Maximum encoded length of a 64-bit varint.
pub const MAX_VARINT_LEN: usize = 10;

/// Append `value` to `buf` in minimal varint form.
pub fn put_uvarint(buf: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

/// Decode a varint from the front of `data`.
///
/// Returns the value and the number of bytes consumed. Truncated input and
/// encodings that overflow 64 bits both report the buffer as corrupt; the
/// caller decides what "corrupt" means at its layer.
pub fn uvarint(data: &[u8]) -> Result<(u64, usize)> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    for (i, &byte) in data.iter().enumerate().take(MAX_VARINT_LEN) {
        // The tenth byte may only contribute the final value bit.
        if i == MAX_VARINT_LEN - 1 && byte > 1 {
            return Err(ProtocolError::CorruptHeader);
        }
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
        shift += 7;
    }
    Err(ProtocolError::CorruptHeader)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn single_byte_values() {
        for value in [0u64, 1, 0x7f] {
            let mut buf = Vec::new();
            put_uvarint(&mut buf, value);
            assert_eq!(buf.len(), 1);
            assert_eq!(uvarint(&buf).unwrap(), (value, 1));
        }
    }

    #[test]
    fn known_encodings() {
        let mut buf = Vec::new();
        put_uvarint(&mut buf, 12455);
        assert_eq!(buf, [0xa7, 0x61]);

        buf.clear();
        put_uvarint(&mut buf, 266);
        assert_eq!(buf, [0x8a, 0x02]);
    }

    #[test]
    fn empty_input_is_corrupt() {
        assert!(matches!(uvarint(&[]), Err(ProtocolError::CorruptHeader)));
    }

    #[test]
    fn truncated_input_is_corrupt() {
        // Continuation bit set, then nothing.
        assert!(matches!(uvarint(&[0x80]), Err(ProtocolError::CorruptHeader)));
    }

    #[test]
    fn overflowing_encoding_is_corrupt() {
        // Ten continuation bytes never terminate within 64 bits.
        let overlong = [0xff; 10];
        assert!(matches!(uvarint(&overlong), Err(ProtocolError::CorruptHeader)));

        // Tenth byte carrying more than the final value bit.
        let mut too_big = [0x80; 10];
        too_big[9] = 0x02;
        assert!(matches!(uvarint(&too_big), Err(ProtocolError::CorruptHeader)));
    }

    #[test]
    fn max_value_round_trips() {
        let mut buf = Vec::new();
        put_uvarint(&mut buf, u64::MAX);
        assert_eq!(buf.len(), MAX_VARINT_LEN);
        assert_eq!(uvarint(&buf).unwrap(), (u64::MAX, MAX_VARINT_LEN));
    }

    proptest! {
        #[test]
        fn round_trip(value in any::<u64>()) {
            let mut buf = Vec::new();
            put_uvarint(&mut buf, value);
            prop_assert!(buf.len() <= MAX_VARINT_LEN);
            let (decoded, consumed) = uvarint(&buf).unwrap();
            prop_assert_eq!(decoded, value);
            prop_assert_eq!(consumed, buf.len());
        }

        #[test]
        fn decoding_ignores_trailing_bytes(value in any::<u64>(), tail in any::<Vec<u8>>()) {
            let mut buf = Vec::new();
            put_uvarint(&mut buf, value);
            let prefix_len = buf.len();
            buf.extend_from_slice(&tail);
            let (decoded, consumed) = uvarint(&buf).unwrap();
            prop_assert_eq!(decoded, value);
            prop_assert_eq!(consumed, prefix_len);
        }
    }
}
