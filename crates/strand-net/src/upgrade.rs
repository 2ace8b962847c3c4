//! Stream upgrade pipeline.
//!
//! Every QUIC bidirectional stream goes through the same steps before a
//! caller or handler sees it:
//!
//! 1. Security negotiation: `/noise` or `/plaintext/2.0.0`. Both ends must
//!    be configured alike; the responder answers `na` otherwise.
//! 2. Security handshake, which yields the remote node id. The initiator
//!    checks it against the node it meant to dial.
//! 3. Protocol negotiation for the application protocol, carried over the
//!    secured channel.

use bytes::BytesMut;
use strand_core::encoding::put_length_prefixed;
use strand_core::{NodeId, PublicKey, PUBLIC_KEY_SIZE};
use strand_proto::negotiation::{
    classify_answer, encode_proposal, encode_reply, expect_header, Answer, NegotiationError,
};
use thiserror::Error;

use crate::noise::{NoiseError, NoiseIdentity, NoiseSession};
use crate::stream::{Channel, StreamError};
use crate::transport::SecurityMode;

/// Reasons a stream upgrade fails.
#[derive(Debug, Error)]
pub(crate) enum UpgradeError {
    /// Remote does not speak our security protocol
    #[error("security protocol {0} rejected by peer")]
    SecurityRejected(String),

    /// Authenticated identity differs from the dialed one
    #[error("peer id mismatch: expected {expected}, got {actual}")]
    PeerIdMismatch {
        /// Node we meant to reach
        expected: NodeId,
        /// Node that answered
        actual: NodeId,
    },

    /// Peer presented an unusable identity key
    #[error("invalid identity key")]
    InvalidKey,

    /// Handshake ended early
    #[error("stream ended during handshake")]
    UnexpectedEof,

    /// Noise failure
    #[error(transparent)]
    Noise(#[from] NoiseError),

    /// Stream failure
    #[error(transparent)]
    Stream(#[from] StreamError),
}

impl From<NegotiationError> for UpgradeError {
    fn from(e: NegotiationError) -> Self {
        UpgradeError::Stream(StreamError::Negotiation(e))
    }
}

/// Local security material used for every upgrade.
pub(crate) struct SecurityContext {
    pub mode: SecurityMode,
    pub public_key: PublicKey,
    pub noise: NoiseIdentity,
}

/// Secures an outbound stream and returns the verified remote node id.
pub(crate) async fn secure_outbound(
    channel: &mut Channel,
    ctx: &SecurityContext,
    expected: &NodeId,
) -> Result<NodeId, UpgradeError> {
    let protocol = ctx.mode.protocol();
    channel.write_all(&encode_proposal(protocol)?).await?;
    expect_header(&channel.read_message().await?)?;
    if classify_answer(protocol, &channel.read_message().await?)? == Answer::NotAvailable {
        return Err(UpgradeError::SecurityRejected(protocol.to_string()));
    }

    let remote = match ctx.mode {
        SecurityMode::Noise => {
            let mut session = NoiseSession::new_initiator(&ctx.noise)?;
            let msg1 = session.write_handshake(&[])?;
            channel.write_frame(&msg1).await?;

            let msg2 = channel.read_frame().await?.ok_or(UpgradeError::UnexpectedEof)?;
            let payload = session.read_handshake(&msg2)?;
            let remote = session.verify_remote(&payload)?;
            check_identity(expected, &remote)?;

            let msg3 = session.write_handshake(ctx.noise.payload())?;
            channel.write_frame(&msg3).await?;
            channel.install_cipher(session.into_transport()?);
            remote
        }
        SecurityMode::Plaintext => {
            write_public_key(channel, &ctx.public_key).await?;
            let remote = read_public_key(channel).await?;
            check_identity(expected, &remote)?;
            remote
        }
    };
    Ok(remote.node_id())
}

/// Secures an inbound stream and returns the remote node id.
pub(crate) async fn secure_inbound(
    channel: &mut Channel,
    ctx: &SecurityContext,
) -> Result<NodeId, UpgradeError> {
    let protocol = ctx.mode.protocol();
    expect_header(&channel.read_message().await?)?;
    let proposal = channel.read_message().await?;
    let accept = proposal == protocol;
    channel.write_all(&encode_reply(&proposal, accept)?).await?;
    if !accept {
        return Err(UpgradeError::SecurityRejected(proposal));
    }

    let remote = match ctx.mode {
        SecurityMode::Noise => {
            let mut session = NoiseSession::new_responder(&ctx.noise)?;
            let msg1 = channel.read_frame().await?.ok_or(UpgradeError::UnexpectedEof)?;
            session.read_handshake(&msg1)?;

            let msg2 = session.write_handshake(ctx.noise.payload())?;
            channel.write_frame(&msg2).await?;

            let msg3 = channel.read_frame().await?.ok_or(UpgradeError::UnexpectedEof)?;
            let payload = session.read_handshake(&msg3)?;
            let remote = session.verify_remote(&payload)?;
            channel.install_cipher(session.into_transport()?);
            remote
        }
        SecurityMode::Plaintext => {
            let remote = read_public_key(channel).await?;
            write_public_key(channel, &ctx.public_key).await?;
            remote
        }
    };
    Ok(remote.node_id())
}

/// Proposes `protocol` on a secured stream.
pub(crate) async fn select_outbound(
    channel: &mut Channel,
    protocol: &str,
) -> Result<Answer, StreamError> {
    channel.write_all(&encode_proposal(protocol)?).await?;
    expect_header(&channel.read_message().await?)?;
    Ok(classify_answer(protocol, &channel.read_message().await?)?)
}

/// Answers a protocol proposal on a secured stream.
///
/// `lookup` maps the proposed protocol to whatever serves it; `None` makes
/// the responder answer `na`.
pub(crate) async fn select_inbound<T>(
    channel: &mut Channel,
    lookup: impl FnOnce(&str) -> Option<T>,
) -> Result<(String, Option<T>), StreamError> {
    expect_header(&channel.read_message().await?)?;
    let proposal = channel.read_message().await?;
    let selected = lookup(&proposal);
    channel
        .write_all(&encode_reply(&proposal, selected.is_some())?)
        .await?;
    Ok((proposal, selected))
}

fn check_identity(expected: &NodeId, remote: &PublicKey) -> Result<(), UpgradeError> {
    let actual = remote.node_id();
    if &actual != expected {
        return Err(UpgradeError::PeerIdMismatch {
            expected: *expected,
            actual,
        });
    }
    Ok(())
}

async fn write_public_key(channel: &mut Channel, key: &PublicKey) -> Result<(), StreamError> {
    let mut buf = BytesMut::new();
    put_length_prefixed(&mut buf, key.as_bytes());
    channel.write_all(&buf).await
}

async fn read_public_key(channel: &mut Channel) -> Result<PublicKey, UpgradeError> {
    let bytes = channel.read_length_prefixed(PUBLIC_KEY_SIZE).await?;
    PublicKey::from_bytes(&bytes).map_err(|_| UpgradeError::InvalidKey)
}
