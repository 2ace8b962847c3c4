//! BLAKE3 digest used for node identity derivation.

/// Computes BLAKE3 in default mode with 256-bit output.
///
/// # Example
/// ```
/// use strand_core::crypto::blake3_hash;
///
/// let hash = blake3_hash(&[]);
/// assert_eq!(
///     hex::encode(hash),
///     "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262"
/// );
/// ```
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blake3_known_answers() {
        assert_eq!(
            hex::encode(blake3_hash(&[])),
            "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262"
        );
        assert_eq!(
            hex::encode(blake3_hash(&[0x00])),
            "2d3adedff11b61f14c886e35afa036736dcd87a74d27b5c1510225d0f592e213"
        );
    }

    #[test]
    fn test_blake3_distinguishes_inputs() {
        assert_ne!(blake3_hash(b"strand-a"), blake3_hash(b"strand-b"));
    }
}
