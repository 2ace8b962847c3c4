//! Wire encoding helpers.
//!
//! # Encoding Rules
//!
//! - **Unsigned varints**: LEB128, 7 bits per byte, least significant group
//!   first, at most 10 bytes for a `u64`. Encodings must be minimal.
//! - **Length-prefixed fields**: `uvarint(len) || bytes`

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Longest LEB128 encoding of a `u64`.
pub const MAX_UVARINT_LEN: usize = 10;

/// Errors during decoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Not enough bytes to decode
    #[error("Insufficient bytes: expected {expected}, got {available}")]
    InsufficientBytes {
        /// Expected number of bytes
        expected: usize,
        /// Actually available bytes
        available: usize,
    },

    /// Varint does not fit in a u64
    #[error("Varint overflow")]
    VarintOverflow,

    /// Varint carries redundant trailing zero groups
    #[error("Varint is not minimally encoded")]
    VarintNotMinimal,

    /// Field exceeds the caller's limit
    #[error("Length {length} exceeds limit {limit}")]
    TooLong {
        /// Declared length
        length: usize,
        /// Permitted maximum
        limit: usize,
    },
}

/// Appends `value` as an unsigned varint.
pub fn put_uvarint(buf: &mut BytesMut, mut value: u64) {
    while value >= 0x80 {
        buf.put_u8((value as u8) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Attempts to decode an unsigned varint from the start of `bytes`.
///
/// Returns `Ok(None)` when more input is needed, otherwise the value and the
/// number of bytes consumed.
pub fn peek_uvarint(bytes: &[u8]) -> Result<Option<(u64, usize)>, DecodeError> {
    let mut value: u64 = 0;
    for (i, &byte) in bytes.iter().enumerate().take(MAX_UVARINT_LEN) {
        let group = u64::from(byte & 0x7f);
        if i == MAX_UVARINT_LEN - 1 && byte > 0x01 {
            return Err(DecodeError::VarintOverflow);
        }
        value |= group << (7 * i);
        if byte & 0x80 == 0 {
            if i > 0 && byte == 0 {
                return Err(DecodeError::VarintNotMinimal);
            }
            return Ok(Some((value, i + 1)));
        }
    }
    if bytes.len() >= MAX_UVARINT_LEN {
        return Err(DecodeError::VarintOverflow);
    }
    Ok(None)
}

/// Decodes an unsigned varint, advancing `buf`.
pub fn get_uvarint(buf: &mut Bytes) -> Result<u64, DecodeError> {
    match peek_uvarint(buf.chunk())? {
        Some((value, used)) => {
            buf.advance(used);
            Ok(value)
        }
        None => Err(DecodeError::InsufficientBytes {
            expected: buf.remaining() + 1,
            available: buf.remaining(),
        }),
    }
}

/// Appends a length-prefixed field.
pub fn put_length_prefixed(buf: &mut BytesMut, data: &[u8]) {
    put_uvarint(buf, data.len() as u64);
    buf.put_slice(data);
}

/// Decodes a length-prefixed field no longer than `limit`.
pub fn get_length_prefixed(buf: &mut Bytes, limit: usize) -> Result<Bytes, DecodeError> {
    let length = get_uvarint(buf)? as usize;
    if length > limit {
        return Err(DecodeError::TooLong { length, limit });
    }
    if buf.remaining() < length {
        return Err(DecodeError::InsufficientBytes {
            expected: length,
            available: buf.remaining(),
        });
    }
    Ok(buf.split_to(length))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: u64) -> Vec<u8> {
        let mut buf = BytesMut::new();
        put_uvarint(&mut buf, value);
        buf.to_vec()
    }

    #[test]
    fn test_uvarint_known_encodings() {
        assert_eq!(encode(0), vec![0x00]);
        assert_eq!(encode(1), vec![0x01]);
        assert_eq!(encode(127), vec![0x7f]);
        assert_eq!(encode(128), vec![0x80, 0x01]);
        assert_eq!(encode(300), vec![0xac, 0x02]);
        assert_eq!(encode(u64::MAX).len(), MAX_UVARINT_LEN);
    }

    #[test]
    fn test_uvarint_decode() {
        let mut buf = Bytes::from(vec![0xac, 0x02, 0xff]);
        assert_eq!(get_uvarint(&mut buf).unwrap(), 300);
        assert_eq!(buf.remaining(), 1);

        let mut max = Bytes::from(encode(u64::MAX));
        assert_eq!(get_uvarint(&mut max).unwrap(), u64::MAX);
    }

    #[test]
    fn test_uvarint_incomplete() {
        assert_eq!(peek_uvarint(&[0x80]).unwrap(), None);
        assert_eq!(peek_uvarint(&[]).unwrap(), None);
        let mut buf = Bytes::from_static(&[0x80, 0x80]);
        assert!(matches!(
            get_uvarint(&mut buf),
            Err(DecodeError::InsufficientBytes { .. })
        ));
    }

    #[test]
    fn test_uvarint_rejects_non_minimal() {
        assert_eq!(peek_uvarint(&[0x81, 0x00]), Err(DecodeError::VarintNotMinimal));
    }

    #[test]
    fn test_uvarint_overflow() {
        let bytes = [0xff; 11];
        assert_eq!(peek_uvarint(&bytes), Err(DecodeError::VarintOverflow));
        let mut eleven = [0xffu8; 10];
        eleven[9] = 0x02;
        assert_eq!(peek_uvarint(&eleven), Err(DecodeError::VarintOverflow));
    }

    #[test]
    fn test_length_prefixed_limit() {
        let mut buf = BytesMut::new();
        put_length_prefixed(&mut buf, b"hello");
        let mut frozen = buf.freeze();
        assert_eq!(
            get_length_prefixed(&mut frozen.clone(), 4),
            Err(DecodeError::TooLong {
                length: 5,
                limit: 4
            })
        );
        assert_eq!(&get_length_prefixed(&mut frozen, 16).unwrap()[..], b"hello");
    }
}
