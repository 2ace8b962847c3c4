//! Protocol handler capability.

use std::sync::Arc;

use async_trait::async_trait;
use strand_core::{NodeId, PublicKey};
use strand_proto::PeerAddress;

use crate::stream::Stream;

/// Read-only view of the host a handler runs on. Carries no private key.
#[derive(Debug, Clone)]
pub struct HostIdentity {
    /// Host node id
    pub node_id: NodeId,
    /// Host identity public key
    pub public_key: PublicKey,
    /// Dialable address of the host
    pub peer_address: PeerAddress,
}

/// Serves inbound streams for one protocol.
///
/// The host invokes `handle` once per accepted stream, each call in its own
/// task. The handler owns the stream and must end it with `close` or
/// `reset` (dropping it resets).
#[async_trait]
pub trait ProtocolHandler: Send + Sync + 'static {
    /// Handles one inbound stream.
    async fn handle(&self, stream: Stream, host: Arc<HostIdentity>);
}
