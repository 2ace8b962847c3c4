//! Ed25519 signatures (RFC 8032 pure mode).

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use thiserror::Error;

use super::{PUBLIC_KEY_SIZE, SIGNATURE_SIZE};

/// Signature errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// The public key bytes are not a valid curve point
    #[error("Invalid Ed25519 public key")]
    InvalidPublicKey,

    /// Signature bytes have the wrong length
    #[error("Invalid signature length: expected {SIGNATURE_SIZE}, got {0}")]
    InvalidLength(usize),

    /// Signature did not verify
    #[error("Signature verification failed")]
    VerificationFailed,
}

/// Derives the Ed25519 public key from a 32-byte secret seed.
pub fn derive_public_key(secret: &[u8; 32]) -> [u8; PUBLIC_KEY_SIZE] {
    SigningKey::from_bytes(secret).verifying_key().to_bytes()
}

/// Signs `message` with the secret seed.
pub fn sign_ed25519(secret: &[u8; 32], message: &[u8]) -> [u8; SIGNATURE_SIZE] {
    SigningKey::from_bytes(secret).sign(message).to_bytes()
}

/// Verifies an Ed25519 signature.
pub fn verify_ed25519(
    public_key: &[u8; PUBLIC_KEY_SIZE],
    message: &[u8],
    signature: &[u8],
) -> Result<(), SignatureError> {
    let key = VerifyingKey::from_bytes(public_key).map_err(|_| SignatureError::InvalidPublicKey)?;
    let bytes: [u8; SIGNATURE_SIZE] = signature
        .try_into()
        .map_err(|_| SignatureError::InvalidLength(signature.len()))?;
    key.verify(message, &Signature::from_bytes(&bytes))
        .map_err(|_| SignatureError::VerificationFailed)
}

/// Returns true if the bytes decode to a valid Ed25519 public key.
pub fn is_valid_public_key(public_key: &[u8; PUBLIC_KEY_SIZE]) -> bool {
    VerifyingKey::from_bytes(public_key).is_ok()
}
