//! Cryptographic primitives for Strand.
//!
//! - BLAKE3 (256-bit default mode) for identity digests
//! - Ed25519 (RFC 8032 pure mode) for node identity keys

mod blake3_hash;
mod signature;

pub use blake3_hash::blake3_hash;
pub use signature::{
    derive_public_key, is_valid_public_key, sign_ed25519, verify_ed25519, SignatureError,
};

/// Ed25519 secret seed size
pub const SECRET_KEY_SIZE: usize = 32;

/// Ed25519 public key size
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Signature size for Ed25519
pub const SIGNATURE_SIZE: usize = 64;
