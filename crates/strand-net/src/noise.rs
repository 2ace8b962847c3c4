//! Noise XX sessions for stream encryption.
//!
//! Uses the XX pattern where both parties transmit their static keys during
//! the handshake:
//!
//! ```text
//! -> e
//! <- e, ee, s, es, payload
//! -> s, se, payload
//! ```
//!
//! The Noise static keys are per-process X25519 keys. Each handshake payload
//! binds the sender's long-term Ed25519 identity to its Noise static key with
//! a signature over [`STATIC_KEY_SIGNATURE_PREFIX`] followed by the static
//! public key, so a peer learns and verifies the other side's node id.

use snow::params::NoiseParams;
use snow::{Builder, HandshakeState, TransportState};
use strand_core::{Keypair, PublicKey, PUBLIC_KEY_SIZE, SIGNATURE_SIZE};
use thiserror::Error;

/// The Noise protocol name.
pub const NOISE_PATTERN: &str = "Noise_XX_25519_ChaChaPoly_BLAKE2s";

/// Domain separator for the static key signature.
pub const STATIC_KEY_SIGNATURE_PREFIX: &[u8] = b"strand-noise-static-key:";

/// Maximum Noise message size.
pub const MAX_MESSAGE_SIZE: usize = 65535;

/// AEAD tag length.
pub const TAG_SIZE: usize = 16;

/// Largest plaintext carried in one transport message.
pub const MAX_PLAINTEXT_SIZE: usize = MAX_MESSAGE_SIZE - TAG_SIZE;

/// Encoded size of a handshake identity payload.
pub const IDENTITY_PAYLOAD_SIZE: usize = PUBLIC_KEY_SIZE + SIGNATURE_SIZE;

fn create_builder<'a>() -> Result<Builder<'a>, NoiseError> {
    let params: NoiseParams = NOISE_PATTERN.parse()?;
    Ok(Builder::new(params))
}

/// Noise session errors.
#[derive(Debug, Error)]
pub enum NoiseError {
    /// Handshake not complete
    #[error("Handshake not complete")]
    HandshakeIncomplete,

    /// Peer sent no identity payload, or a malformed one
    #[error("Invalid identity payload: {0}")]
    InvalidPayload(String),

    /// The identity signature does not cover the peer's static key
    #[error("Identity signature does not match the Noise static key")]
    BadSignature,

    /// Snow error
    #[error("Noise error: {0}")]
    Snow(#[from] snow::Error),
}

/// This node's Noise static key, signed by its identity key.
pub struct NoiseIdentity {
    private: Vec<u8>,
    payload: Vec<u8>,
}

impl NoiseIdentity {
    /// Generates a static key and signs it with `identity`.
    pub fn generate(identity: &Keypair) -> Result<Self, NoiseError> {
        let keypair = create_builder()?.generate_keypair()?;
        let mut message = STATIC_KEY_SIGNATURE_PREFIX.to_vec();
        message.extend_from_slice(&keypair.public);

        let mut payload = Vec::with_capacity(IDENTITY_PAYLOAD_SIZE);
        payload.extend_from_slice(identity.public_key().as_bytes());
        payload.extend_from_slice(&identity.sign(&message));

        Ok(Self {
            private: keypair.private,
            payload,
        })
    }

    /// Returns the signed identity payload sent during the handshake.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// Checks a peer's identity payload against its Noise static key.
pub fn verify_identity_payload(
    payload: &[u8],
    remote_static: &[u8],
) -> Result<PublicKey, NoiseError> {
    if payload.len() != IDENTITY_PAYLOAD_SIZE {
        return Err(NoiseError::InvalidPayload(format!(
            "expected {} bytes, got {}",
            IDENTITY_PAYLOAD_SIZE,
            payload.len()
        )));
    }
    let (key, signature) = payload.split_at(PUBLIC_KEY_SIZE);
    let public_key =
        PublicKey::from_bytes(key).map_err(|e| NoiseError::InvalidPayload(e.to_string()))?;

    let mut message = STATIC_KEY_SIGNATURE_PREFIX.to_vec();
    message.extend_from_slice(remote_static);
    public_key
        .verify(&message, signature)
        .map_err(|_| NoiseError::BadSignature)?;
    Ok(public_key)
}

/// Noise XX handshake in progress.
pub struct NoiseSession {
    handshake: Box<HandshakeState>,
}

impl NoiseSession {
    /// Creates a new initiator session.
    pub fn new_initiator(local: &NoiseIdentity) -> Result<Self, NoiseError> {
        let handshake = create_builder()?
            .local_private_key(&local.private)
            .build_initiator()?;
        Ok(Self {
            handshake: Box::new(handshake),
        })
    }

    /// Creates a new responder session.
    pub fn new_responder(local: &NoiseIdentity) -> Result<Self, NoiseError> {
        let handshake = create_builder()?
            .local_private_key(&local.private)
            .build_responder()?;
        Ok(Self {
            handshake: Box::new(handshake),
        })
    }

    /// Returns true once all handshake messages were exchanged.
    pub fn is_handshake_complete(&self) -> bool {
        self.handshake.is_handshake_finished()
    }

    /// Returns the remote static key once it has been received.
    pub fn remote_static(&self) -> Option<&[u8]> {
        self.handshake.get_remote_static()
    }

    /// Writes a handshake message.
    pub fn write_handshake(&mut self, payload: &[u8]) -> Result<Vec<u8>, NoiseError> {
        let mut buf = vec![0u8; payload.len() + 128];
        let len = self.handshake.write_message(payload, &mut buf)?;
        buf.truncate(len);
        Ok(buf)
    }

    /// Reads a handshake message, returning its payload.
    pub fn read_handshake(&mut self, message: &[u8]) -> Result<Vec<u8>, NoiseError> {
        let mut buf = vec![0u8; message.len()];
        let len = self.handshake.read_message(message, &mut buf)?;
        buf.truncate(len);
        Ok(buf)
    }

    /// Verifies the identity payload just read and returns the peer's key.
    pub fn verify_remote(&self, payload: &[u8]) -> Result<PublicKey, NoiseError> {
        let remote_static = self
            .remote_static()
            .ok_or_else(|| NoiseError::InvalidPayload("no remote static key".to_string()))?;
        verify_identity_payload(payload, remote_static)
    }

    /// Completes the handshake and returns the transport cipher state.
    pub fn into_transport(self) -> Result<TransportState, NoiseError> {
        if !self.is_handshake_complete() {
            return Err(NoiseError::HandshakeIncomplete);
        }
        Ok(self.handshake.into_transport_mode()?)
    }
}

/// Encrypts one transport message.
pub fn encrypt(state: &mut TransportState, plaintext: &[u8]) -> Result<Vec<u8>, NoiseError> {
    let mut buf = vec![0u8; plaintext.len() + TAG_SIZE];
    let len = state.write_message(plaintext, &mut buf)?;
    buf.truncate(len);
    Ok(buf)
}

/// Decrypts one transport message.
pub fn decrypt(state: &mut TransportState, ciphertext: &[u8]) -> Result<Vec<u8>, NoiseError> {
    let mut buf = vec![0u8; ciphertext.len()];
    let len = state.read_message(ciphertext, &mut buf)?;
    buf.truncate(len);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handshake(
        initiator_id: &Keypair,
        responder_id: &Keypair,
    ) -> (TransportState, TransportState, PublicKey, PublicKey) {
        let local = NoiseIdentity::generate(initiator_id).unwrap();
        let remote = NoiseIdentity::generate(responder_id).unwrap();
        let mut initiator = NoiseSession::new_initiator(&local).unwrap();
        let mut responder = NoiseSession::new_responder(&remote).unwrap();

        let msg1 = initiator.write_handshake(&[]).unwrap();
        assert!(responder.read_handshake(&msg1).unwrap().is_empty());

        let msg2 = responder.write_handshake(remote.payload()).unwrap();
        let payload2 = initiator.read_handshake(&msg2).unwrap();
        let seen_by_initiator = initiator.verify_remote(&payload2).unwrap();

        let msg3 = initiator.write_handshake(local.payload()).unwrap();
        let payload3 = responder.read_handshake(&msg3).unwrap();
        let seen_by_responder = responder.verify_remote(&payload3).unwrap();

        assert!(initiator.is_handshake_complete());
        assert!(responder.is_handshake_complete());
        (
            initiator.into_transport().unwrap(),
            responder.into_transport().unwrap(),
            seen_by_initiator,
            seen_by_responder,
        )
    }

    #[test]
    fn test_xx_handshake_authenticates_both_sides() {
        let a = Keypair::generate(Some(1)).unwrap();
        let b = Keypair::generate(Some(2)).unwrap();
        let (_, _, seen_b, seen_a) = handshake(&a, &b);
        assert_eq!(seen_b.node_id(), b.node_id());
        assert_eq!(seen_a.node_id(), a.node_id());
    }

    #[test]
    fn test_transport_roundtrip() {
        let a = Keypair::generate(Some(1)).unwrap();
        let b = Keypair::generate(Some(2)).unwrap();
        let (mut initiator, mut responder, _, _) = handshake(&a, &b);

        let ciphertext = encrypt(&mut initiator, b"Hello, world!\n").unwrap();
        assert_eq!(ciphertext.len(), 14 + TAG_SIZE);
        assert_eq!(decrypt(&mut responder, &ciphertext).unwrap(), b"Hello, world!\n");

        let back = encrypt(&mut responder, b"reply").unwrap();
        assert_eq!(decrypt(&mut initiator, &back).unwrap(), b"reply");
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let a = Keypair::generate(Some(1)).unwrap();
        let b = Keypair::generate(Some(2)).unwrap();
        let (mut initiator, mut responder, _, _) = handshake(&a, &b);
        let mut ciphertext = encrypt(&mut initiator, b"data").unwrap();
        ciphertext[0] ^= 0xff;
        assert!(decrypt(&mut responder, &ciphertext).is_err());
    }

    #[test]
    fn test_payload_for_other_static_key_rejected() {
        let id = Keypair::generate(Some(5)).unwrap();
        let signed = NoiseIdentity::generate(&id).unwrap();
        let other_static = [9u8; 32];
        assert!(matches!(
            verify_identity_payload(signed.payload(), &other_static),
            Err(NoiseError::BadSignature)
        ));
    }

    #[test]
    fn test_truncated_payload_rejected() {
        assert!(matches!(
            verify_identity_payload(&[0u8; 10], &[0u8; 32]),
            Err(NoiseError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_incomplete_handshake() {
        let id = Keypair::generate(Some(5)).unwrap();
        let local = NoiseIdentity::generate(&id).unwrap();
        let session = NoiseSession::new_initiator(&local).unwrap();
        assert!(!session.is_handshake_complete());
        assert!(matches!(
            session.into_transport(),
            Err(NoiseError::HandshakeIncomplete)
        ));
    }
}
