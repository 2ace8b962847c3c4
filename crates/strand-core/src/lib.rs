//! Strand Core - Identity and encoding primitives for Strand nodes.
//!
//! This crate provides:
//! - Cryptographic primitives (BLAKE3, Ed25519)
//! - Node key pairs and public keys
//! - Self-certifying node identifiers
//! - Varint wire encoding

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod crypto;
pub mod encoding;
pub mod identifiers;
pub mod identity;

pub use crypto::*;
pub use encoding::DecodeError;
pub use identifiers::*;
pub use identity::*;
