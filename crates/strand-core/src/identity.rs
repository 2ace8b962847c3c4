//! Node identity keys.
//!
//! Every node owns exactly one Ed25519 key pair for its lifetime. The secret
//! half never leaves the `Keypair`: it has no serde impls, its `Debug` output
//! is redacted and it is zeroized on drop. The public half derives the
//! node's [`NodeId`].

use std::fmt;

use rand::rngs::OsRng;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroize;

use crate::crypto::{
    derive_public_key, is_valid_public_key, sign_ed25519, verify_ed25519, SignatureError,
    PUBLIC_KEY_SIZE, SECRET_KEY_SIZE, SIGNATURE_SIZE,
};
use crate::identifiers::NodeId;

/// Identity errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// The entropy source failed
    #[error("Key generation failed: {0}")]
    KeyGenerationFailed(String),

    /// Bytes do not form a valid Ed25519 public key
    #[error("Invalid public key")]
    InvalidPublicKey,
}

/// Ed25519 public key of a node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey([u8; PUBLIC_KEY_SIZE]);

impl PublicKey {
    /// Parses a public key, rejecting bytes that are not a curve point.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        let arr: [u8; PUBLIC_KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| IdentityError::InvalidPublicKey)?;
        if !is_valid_public_key(&arr) {
            return Err(IdentityError::InvalidPublicKey);
        }
        Ok(Self(arr))
    }

    /// Returns the raw key bytes.
    pub const fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }

    /// Derives the node identifier for this key.
    pub fn node_id(&self) -> NodeId {
        NodeId::from_public_key(&self.0)
    }

    /// Verifies a signature made by the matching secret key.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), SignatureError> {
        verify_ed25519(&self.0, message, signature)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", &hex::encode(self.0)[..16])
    }
}

/// Ed25519 key pair owned by a node.
pub struct Keypair {
    secret: [u8; SECRET_KEY_SIZE],
    public: PublicKey,
}

impl Keypair {
    /// Generates a key pair.
    ///
    /// With no seed, or a seed of zero, the secret comes from the operating
    /// system CSPRNG. A non-zero seed drives a ChaCha20 generator so the same
    /// seed always yields the same key pair; that mode exists for reproducible
    /// tests and demos only.
    pub fn generate(seed: Option<u64>) -> Result<Self, IdentityError> {
        let mut secret = [0u8; SECRET_KEY_SIZE];
        match seed {
            None | Some(0) => OsRng
                .try_fill_bytes(&mut secret)
                .map_err(|e| IdentityError::KeyGenerationFailed(e.to_string()))?,
            Some(seed) => ChaCha20Rng::seed_from_u64(seed).fill_bytes(&mut secret),
        }
        let keypair = Self::from_secret(secret);
        secret.zeroize();
        Ok(keypair)
    }

    /// Builds a key pair from a 32-byte secret seed.
    pub fn from_secret(secret: [u8; SECRET_KEY_SIZE]) -> Self {
        let public = PublicKey(derive_public_key(&secret));
        Self { secret, public }
    }

    /// Returns the public key.
    pub const fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Returns the node identifier derived from the public key.
    pub fn node_id(&self) -> NodeId {
        self.public.node_id()
    }

    /// Signs a message.
    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_SIZE] {
        sign_ed25519(&self.secret, message)
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public", &self.public)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl Drop for Keypair {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_is_deterministic() {
        let a = Keypair::generate(Some(42)).unwrap();
        let b = Keypair::generate(Some(42)).unwrap();
        assert_eq!(a.public_key(), b.public_key());
        assert_eq!(a.node_id(), b.node_id());
    }

    #[test]
    fn test_distinct_seeds_differ() {
        let a = Keypair::generate(Some(42)).unwrap();
        let b = Keypair::generate(Some(99)).unwrap();
        assert_ne!(a.node_id(), b.node_id());
    }

    #[test]
    fn test_zero_seed_is_random() {
        let a = Keypair::generate(Some(0)).unwrap();
        let b = Keypair::generate(None).unwrap();
        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn test_sign_verify() {
        let kp = Keypair::generate(Some(7)).unwrap();
        let sig = kp.sign(b"strand");
        assert!(kp.public_key().verify(b"strand", &sig).is_ok());
        assert_eq!(
            kp.public_key().verify(b"other", &sig),
            Err(SignatureError::VerificationFailed)
        );
    }

    #[test]
    fn test_public_key_from_bytes() {
        let kp = Keypair::generate(Some(3)).unwrap();
        let parsed = PublicKey::from_bytes(kp.public_key().as_bytes()).unwrap();
        assert_eq!(parsed.node_id(), kp.node_id());
        assert_eq!(
            PublicKey::from_bytes(&[1u8; 31]),
            Err(IdentityError::InvalidPublicKey)
        );
    }

    #[test]
    fn test_debug_redacts_secret() {
        let kp = Keypair::from_secret([0x55; 32]);
        let rendered = format!("{:?}", kp);
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("5555555555"));
    }
}
