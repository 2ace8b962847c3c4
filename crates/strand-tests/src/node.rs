//! Test node implementation for integration testing.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use strand_core::{Keypair, NodeId};
use strand_net::{
    echo, EchoHandler, Host, HostConfig, HostError, PeerRecord, ProtocolHandler, SecurityMode,
    Stream, Ttl,
};
use strand_proto::{PeerAddress, ProtocolId};
use tracing::{debug, info};

/// Configuration for a test node.
#[derive(Debug, Clone)]
pub struct TestNodeConfig {
    /// Listen address
    pub listen_addr: SocketAddr,
    /// Key seed; `None` draws a random identity
    pub seed: Option<u64>,
    /// Stream security mode
    pub security: SecurityMode,
    /// Register the echo handler on start
    pub serve_echo: bool,
    /// How long shutdown waits for in-flight handlers
    pub drain_timeout: Duration,
}

impl Default for TestNodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            seed: None,
            security: SecurityMode::Noise,
            serve_echo: true,
            drain_timeout: Duration::from_secs(5),
        }
    }
}

impl TestNodeConfig {
    /// Seeded identity.
    pub fn seeded(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Default::default()
        }
    }

    /// Plaintext streams instead of Noise.
    pub fn insecure(mut self) -> Self {
        self.security = SecurityMode::Plaintext;
        self
    }

    /// Does not register the echo handler.
    pub fn without_echo(mut self) -> Self {
        self.serve_echo = false;
        self
    }

    /// Shorter or longer shutdown drain.
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }
}

/// A running host plus test helpers.
pub struct TestNode {
    /// Node ID
    pub node_id: NodeId,
    /// The host under test
    pub host: Host,
}

impl TestNode {
    /// Generates an identity and starts a host for it.
    pub async fn start(config: TestNodeConfig) -> Result<Self> {
        let keypair = Keypair::generate(config.seed).context("generating keypair")?;
        let host_config = HostConfig::default()
            .with_listen_addr(config.listen_addr)
            .with_security(config.security)
            .with_dial_timeout(Duration::from_secs(5))
            .with_drain_timeout(config.drain_timeout);

        let host = Host::start(host_config, keypair)
            .await
            .context("starting host")?;
        if config.serve_echo {
            host.register_handler(ProtocolId::echo(), Arc::new(EchoHandler::default()))?;
        }

        let node_id = host.node_id();
        info!(node_id = %node_id, addr = %host.peer_address(), "Test node started");
        Ok(Self { node_id, host })
    }

    /// Returns the bound socket address.
    pub fn addr(&self) -> SocketAddr {
        self.host.local_addr()
    }

    /// Returns the dialable address of this node.
    pub fn peer_address(&self) -> PeerAddress {
        self.host.peer_address()
    }

    /// Registers a handler for `protocol`.
    pub fn serve(&self, protocol: &str, handler: Arc<dyn ProtocolHandler>) -> Result<()> {
        self.host
            .register_handler(ProtocolId::new(protocol)?, handler)?;
        Ok(())
    }

    /// Adds `other` to this node's directory as a permanent peer.
    pub fn learn(&self, other: &TestNode) {
        self.host.add_peer(PeerRecord::permanent(&other.peer_address()));
        debug!(from = %self.node_id, to = %other.node_id, "Learned peer");
    }

    /// Adds `other` with a finite TTL.
    pub fn learn_for(&self, other: &TestNode, ttl: Duration) {
        let peer = other.peer_address();
        self.host.add_peer(PeerRecord::new(
            peer.node_id(),
            peer.transport().clone(),
            Ttl::Expires(ttl),
        ));
    }

    /// Opens a stream to `peer`.
    pub async fn open(&self, peer: &NodeId, protocol: &ProtocolId) -> Result<Stream, HostError> {
        self.host.open_stream(peer, protocol).await
    }

    /// Runs one echo exchange with `peer`.
    pub async fn echo(&self, peer: &NodeId, message: &[u8]) -> Result<Vec<u8>> {
        let stream = self
            .host
            .open_stream(peer, &ProtocolId::echo())
            .await
            .with_context(|| format!("opening echo stream to {}", peer))?;
        let reply = echo::initiate(stream, message).await?;
        Ok(reply)
    }

    /// Returns the number of live outbound connections.
    pub fn connection_count(&self) -> usize {
        self.host.connection_count()
    }

    /// Shuts the host down.
    pub async fn shutdown(&self) {
        self.host.shutdown().await;
    }
}

impl Drop for TestNode {
    fn drop(&mut self) {
        debug!(node_id = %self.node_id, "Dropping test node");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_node_start() {
        let node = TestNode::start(TestNodeConfig::default()).await.unwrap();
        assert!(node.addr().port() > 0);
        assert_eq!(node.peer_address().node_id(), node.node_id);
    }

    #[tokio::test]
    async fn test_seeded_node_id_is_stable() {
        let a = TestNode::start(TestNodeConfig::seeded(42)).await.unwrap();
        let expected = Keypair::generate(Some(42)).unwrap().node_id();
        assert_eq!(a.node_id, expected);
    }
}
