//! Node identifiers.
//!
//! A `NodeId` is the BLAKE3 digest of a node's Ed25519 public key. Its text
//! form wraps the digest in a multihash-style envelope (`0x1e` = BLAKE3-256,
//! `0x20` = 32 bytes) and encodes the 34 bytes as unpadded base64url, so the
//! string is safe to embed as an address segment.

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::blake3_hash;

/// Multihash code for BLAKE3-256.
pub const BLAKE3_MULTIHASH_CODE: u8 = 0x1e;

/// Digest length carried in the multihash envelope.
pub const NODE_ID_DIGEST_LEN: usize = 32;

/// Errors decoding a textual node identifier.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NodeIdError {
    /// Not valid unpadded base64url
    #[error("Invalid base64url: {0}")]
    InvalidBase64(String),

    /// Envelope names a hash function other than BLAKE3-256
    #[error("Unsupported multihash code 0x{0:02x}")]
    UnsupportedHash(u8),

    /// Envelope length does not match the digest
    #[error("Invalid digest length: expected {NODE_ID_DIGEST_LEN}, got {0}")]
    InvalidLength(usize),
}

/// Self-certifying node identity: BLAKE3(public_key).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub [u8; 32]);

impl NodeId {
    /// Creates a node identifier from a raw digest.
    pub const fn new(digest: [u8; 32]) -> Self {
        Self(digest)
    }

    /// Derives the identifier of an Ed25519 public key.
    pub fn from_public_key(public_key: &[u8; 32]) -> Self {
        Self(blake3_hash(public_key))
    }

    /// Returns the raw digest.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns the multihash envelope `code || len || digest`.
    pub fn to_multihash(&self) -> [u8; NODE_ID_DIGEST_LEN + 2] {
        let mut out = [0u8; NODE_ID_DIGEST_LEN + 2];
        out[0] = BLAKE3_MULTIHASH_CODE;
        out[1] = NODE_ID_DIGEST_LEN as u8;
        out[2..].copy_from_slice(&self.0);
        out
    }

    /// Decodes a multihash envelope.
    pub fn from_multihash(bytes: &[u8]) -> Result<Self, NodeIdError> {
        if bytes.len() < 2 {
            return Err(NodeIdError::InvalidLength(bytes.len()));
        }
        if bytes[0] != BLAKE3_MULTIHASH_CODE {
            return Err(NodeIdError::UnsupportedHash(bytes[0]));
        }
        let digest = &bytes[2..];
        if bytes[1] as usize != NODE_ID_DIGEST_LEN || digest.len() != NODE_ID_DIGEST_LEN {
            return Err(NodeIdError::InvalidLength(digest.len()));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(digest);
        Ok(Self(arr))
    }

    /// Encodes as the canonical text form.
    pub fn to_text(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.to_multihash())
    }

    /// Decodes the canonical text form.
    pub fn from_text(s: &str) -> Result<Self, NodeIdError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(s)
            .map_err(|e| NodeIdError::InvalidBase64(e.to_string()))?;
        Self::from_multihash(&bytes)
    }

    /// Returns the digest as hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl FromStr for NodeId {
    type Err = NodeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_text(s)
    }
}

impl From<[u8; 32]> for NodeId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for NodeId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_roundtrip() {
        let id = NodeId::from_public_key(&[0x42; 32]);
        let text = id.to_text();
        assert_eq!(text.len(), 46);
        assert_eq!(NodeId::from_text(&text).unwrap(), id);
        assert_eq!(text.parse::<NodeId>().unwrap(), id);
    }

    #[test]
    fn test_text_is_segment_safe() {
        for seed in 0u8..32 {
            let text = NodeId::from_public_key(&[seed; 32]).to_text();
            assert!(!text.contains('/'));
            assert!(!text.contains('='));
        }
    }

    #[test]
    fn test_unsupported_hash_code() {
        let mut envelope = NodeId::new([7; 32]).to_multihash();
        envelope[0] = 0x12;
        let text = URL_SAFE_NO_PAD.encode(envelope);
        assert_eq!(
            NodeId::from_text(&text),
            Err(NodeIdError::UnsupportedHash(0x12))
        );
    }

    #[test]
    fn test_truncated_digest() {
        let envelope = NodeId::new([7; 32]).to_multihash();
        let text = URL_SAFE_NO_PAD.encode(&envelope[..20]);
        assert!(matches!(
            NodeId::from_text(&text),
            Err(NodeIdError::InvalidLength(18))
        ));
    }

    #[test]
    fn test_invalid_base64() {
        assert!(matches!(
            NodeId::from_text("not base64!"),
            Err(NodeIdError::InvalidBase64(_))
        ));
    }

    #[test]
    fn test_display_matches_text() {
        let id = NodeId::new([0xAB; 32]);
        assert_eq!(id.to_string(), id.to_text());
        assert!(format!("{:?}", id).starts_with("NodeId(abababab"));
    }
}
