//! Node host.
//!
//! The host owns the node identity and a QUIC endpoint, keeps the peer
//! directory and the handler registry, opens streams to known peers and
//! dispatches inbound streams to handlers.
//!
//! Lifecycle: `Listening -> ShuttingDown -> Closed`. Dialing and accepting
//! happen concurrently while listening.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use quinn::{ConnectionError, Endpoint, RecvStream, SendStream, VarInt};
use strand_core::{Keypair, NodeId};
use strand_proto::negotiation::Answer;
use strand_proto::{compose, PeerAddress, ProtocolId, TransportAddress, TransportProtocol};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::connection::{ConnectionPool, PooledConnection};
use crate::directory::{PeerDirectory, PeerRecord};
use crate::handler::{HostIdentity, ProtocolHandler};
use crate::noise::NoiseIdentity;
use crate::quic::{bind_endpoint, SERVER_NAME};
use crate::stream::{Channel, Stream};
use crate::transport::HostConfig;
use crate::upgrade::{
    secure_inbound, secure_outbound, select_inbound, select_outbound, SecurityContext,
    UpgradeError,
};

/// Host errors.
#[derive(Debug, Error)]
pub enum HostError {
    /// The listener could not be set up
    #[error("Failed to bind {addr}: {reason}")]
    BindFailed {
        /// Requested listen address
        addr: SocketAddr,
        /// Underlying failure
        reason: String,
    },

    /// No unexpired directory record for the peer
    #[error("Unknown peer {0}")]
    PeerUnknown(NodeId),

    /// Connecting or securing the stream failed
    #[error("Dial to {peer} failed: {reason}")]
    DialFailed {
        /// Peer being dialed
        peer: NodeId,
        /// Underlying failure
        reason: String,
    },

    /// The peer does not serve the protocol
    #[error("Peer {peer} rejected protocol {protocol}")]
    ProtocolRejected {
        /// Peer being dialed
        peer: NodeId,
        /// Protocol that was proposed
        protocol: ProtocolId,
    },

    /// The host is shutting down or closed
    #[error("Host is shutting down")]
    ShuttingDown,
}

/// Host lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    /// Accepting and opening streams
    Listening,
    /// Draining in-flight handlers
    ShuttingDown,
    /// Endpoint closed
    Closed,
}

type HandlerMap = HashMap<ProtocolId, Arc<dyn ProtocolHandler>>;

struct HostInner {
    keypair: Keypair,
    identity: Arc<HostIdentity>,
    config: HostConfig,
    endpoint: Endpoint,
    local_addr: SocketAddr,
    security: SecurityContext,
    handlers: RwLock<HandlerMap>,
    directory: PeerDirectory,
    connections: ConnectionPool,
    state: RwLock<HostState>,
    shutdown_tx: watch::Sender<bool>,
    closed_tx: watch::Sender<bool>,
    /// Cloned into every inbound stream task; dropped on shutdown
    drain_tx: Mutex<Option<mpsc::Sender<()>>>,
    drain_rx: tokio::sync::Mutex<mpsc::Receiver<()>>,
}

/// A running node. Cheap to clone; clones share the same host.
#[derive(Clone)]
pub struct Host {
    inner: Arc<HostInner>,
}

impl Host {
    /// Binds the endpoint and starts accepting connections.
    pub async fn start(config: HostConfig, keypair: Keypair) -> Result<Host, HostError> {
        let bind_failed = |reason: String| HostError::BindFailed {
            addr: config.listen_addr,
            reason,
        };
        let endpoint = bind_endpoint(&config).map_err(|e| bind_failed(e.to_string()))?;
        let local_addr = endpoint
            .local_addr()
            .map_err(|e| bind_failed(e.to_string()))?;
        let noise = NoiseIdentity::generate(&keypair).map_err(|e| bind_failed(e.to_string()))?;

        let node_id = keypair.node_id();
        let identity = Arc::new(HostIdentity {
            node_id,
            public_key: *keypair.public_key(),
            peer_address: compose(&TransportAddress::quic(local_addr), node_id),
        });
        let security = SecurityContext {
            mode: config.security,
            public_key: *keypair.public_key(),
            noise,
        };
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (drain_tx, drain_rx) = mpsc::channel(1);

        let inner = Arc::new(HostInner {
            keypair,
            identity,
            config,
            endpoint: endpoint.clone(),
            local_addr,
            security,
            handlers: RwLock::new(HashMap::new()),
            directory: PeerDirectory::new(),
            connections: ConnectionPool::default(),
            state: RwLock::new(HostState::Listening),
            shutdown_tx,
            closed_tx: watch::channel(false).0,
            drain_tx: Mutex::new(Some(drain_tx)),
            drain_rx: tokio::sync::Mutex::new(drain_rx),
        });

        tokio::spawn(accept_loop(Arc::downgrade(&inner), endpoint, shutdown_rx));

        info!(
            peer_address = %inner.identity.peer_address,
            security = ?inner.config.security,
            "Host listening"
        );
        Ok(Host { inner })
    }

    /// Returns the node id.
    pub fn node_id(&self) -> NodeId {
        self.inner.keypair.node_id()
    }

    /// Returns the dialable address of this host.
    pub fn peer_address(&self) -> PeerAddress {
        self.inner.identity.peer_address.clone()
    }

    /// Returns the read-only identity handed to handlers.
    pub fn identity(&self) -> Arc<HostIdentity> {
        Arc::clone(&self.inner.identity)
    }

    /// Returns the bound socket address.
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> HostState {
        *self.inner.state.read()
    }

    /// Returns the configuration the host was started with.
    pub fn config(&self) -> &HostConfig {
        &self.inner.config
    }

    /// Returns the peer directory.
    pub fn directory(&self) -> &PeerDirectory {
        &self.inner.directory
    }

    /// Returns all unexpired peer records.
    pub fn peers(&self) -> Vec<PeerRecord> {
        self.inner.directory.snapshot()
    }

    /// Returns the number of live outbound connections.
    pub fn connection_count(&self) -> usize {
        self.inner.connections.live_count()
    }

    /// Registers `handler` for `protocol`, replacing any previous handler.
    pub fn register_handler(
        &self,
        protocol: ProtocolId,
        handler: Arc<dyn ProtocolHandler>,
    ) -> Result<(), HostError> {
        self.inner.ensure_listening()?;
        let replaced = self
            .inner
            .handlers
            .write()
            .insert(protocol.clone(), handler)
            .is_some();
        debug!(protocol = %protocol, replaced, "Handler registered");
        Ok(())
    }

    /// Stores a peer record. Last write wins. Expired records are swept on
    /// each insert.
    pub fn add_peer(&self, record: PeerRecord) {
        let swept = self.inner.directory.collect_garbage();
        if swept > 0 {
            debug!(swept, "Expired peer records dropped");
        }
        self.inner.directory.insert(record);
    }

    /// Opens a stream to `peer` speaking `protocol`.
    ///
    /// Fails with `PeerUnknown` without touching the network if the
    /// directory has no unexpired record for the peer.
    pub async fn open_stream(
        &self,
        peer: &NodeId,
        protocol: &ProtocolId,
    ) -> Result<Stream, HostError> {
        self.inner.ensure_listening()?;
        let record = self
            .inner
            .directory
            .get(peer)
            .ok_or(HostError::PeerUnknown(*peer))?;

        let dial = self.inner.dial_and_upgrade(&record, protocol);
        match tokio::time::timeout(self.inner.config.dial_timeout, dial).await {
            Ok(result) => result,
            Err(_) => Err(HostError::DialFailed {
                peer: *peer,
                reason: format!("timed out after {:?}", self.inner.config.dial_timeout),
            }),
        }
    }

    /// Stops accepting work, waits up to `drain_timeout` for in-flight
    /// handlers and closes the endpoint.
    pub async fn shutdown(&self) {
        let first = {
            let mut state = self.inner.state.write();
            let first = *state == HostState::Listening;
            if first {
                *state = HostState::ShuttingDown;
            }
            first
        };
        if !first {
            // Another caller is draining; wait for it to finish.
            let mut closed = self.inner.closed_tx.subscribe();
            let _ = closed.wait_for(|closed| *closed).await;
            return;
        }
        info!(node = %self.node_id(), "Host shutting down");

        self.inner.shutdown_tx.send_replace(true);
        self.inner.drain_tx.lock().take();
        {
            let mut drain = self.inner.drain_rx.lock().await;
            let drained = async { while drain.recv().await.is_some() {} };
            let drain_timeout = self.inner.config.drain_timeout;
            if tokio::time::timeout(drain_timeout, drained).await.is_err() {
                warn!(
                    node = %self.node_id(),
                    timeout = ?drain_timeout,
                    "Handlers still running after drain timeout, closing connections"
                );
            }
        }

        // Closing the endpoint also aborts inbound connections and any
        // handler still blocked on them.
        self.inner.connections.close_all(b"shutdown");
        self.inner.endpoint.close(VarInt::from_u32(0), b"shutdown");
        self.inner.endpoint.wait_idle().await;
        *self.inner.state.write() = HostState::Closed;
        self.inner.closed_tx.send_replace(true);
        info!(node = %self.node_id(), "Host closed");
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("node_id", &self.node_id())
            .field("local_addr", &self.inner.local_addr)
            .field("state", &self.state())
            .finish()
    }
}

impl HostInner {
    fn ensure_listening(&self) -> Result<(), HostError> {
        if *self.state.read() != HostState::Listening {
            return Err(HostError::ShuttingDown);
        }
        Ok(())
    }

    /// Returns a drain guard, or `None` once shutdown began.
    fn drain_guard(&self) -> Option<mpsc::Sender<()>> {
        if *self.state.read() != HostState::Listening {
            return None;
        }
        self.drain_tx.lock().clone()
    }

    fn handler_for(&self, proposal: &str) -> Option<(ProtocolId, Arc<dyn ProtocolHandler>)> {
        let protocol = ProtocolId::new(proposal).ok()?;
        let handler = self.handlers.read().get(&protocol).cloned()?;
        Some((protocol, handler))
    }

    async fn dial_and_upgrade(
        self: &Arc<Self>,
        record: &PeerRecord,
        protocol: &ProtocolId,
    ) -> Result<Stream, HostError> {
        let peer = record.node_id;
        let dial_failed = |reason: String| HostError::DialFailed { peer, reason };

        if record.address.protocol != TransportProtocol::QuicV1 {
            return Err(dial_failed(format!(
                "unsupported transport in {}",
                record.address
            )));
        }
        let addr = record
            .address
            .resolve()
            .await
            .map_err(|e| dial_failed(format!("cannot resolve {}: {}", record.address, e)))?;
        let conn = self.connect(&peer, addr).await?;
        let (send, recv) = conn
            .open_bi()
            .await
            .map_err(|e| dial_failed(e.to_string()))?;

        let mut channel = Channel::new(send, recv);
        let remote = secure_outbound(&mut channel, &self.security, &peer)
            .await
            .map_err(|e| dial_failed(e.to_string()))?;

        match select_outbound(&mut channel, protocol.as_str()).await {
            Ok(Answer::Accepted) => {
                debug!(peer = %remote, protocol = %protocol, "Stream opened");
                Ok(Stream::new(channel, self.identity.node_id, remote, protocol.clone()))
            }
            Ok(Answer::NotAvailable) => Err(HostError::ProtocolRejected {
                peer,
                protocol: protocol.clone(),
            }),
            Err(e) => Err(dial_failed(e.to_string())),
        }
    }

    /// Returns a live connection to `peer` at `addr`, dialing if needed.
    async fn connect(
        self: &Arc<Self>,
        peer: &NodeId,
        addr: SocketAddr,
    ) -> Result<quinn::Connection, HostError> {
        if let Some(conn) = self.connections.get(peer, addr) {
            return Ok(conn);
        }
        let dial_failed = |reason: String| HostError::DialFailed {
            peer: *peer,
            reason,
        };
        let conn = self
            .endpoint
            .connect(addr, SERVER_NAME)
            .map_err(|e| dial_failed(e.to_string()))?
            .await
            .map_err(|e| dial_failed(e.to_string()))?;
        debug!(peer = %peer, remote = %addr, "Connected");

        let pooled = self
            .connections
            .insert(*peer, PooledConnection::new(addr, conn.clone()));
        if pooled.stable_id() == conn.stable_id() {
            tokio::spawn(serve_connection(
                Arc::downgrade(self),
                conn,
                self.shutdown_tx.subscribe(),
            ));
        }
        Ok(pooled)
    }

    async fn handle_inbound(
        self: Arc<Self>,
        send: SendStream,
        recv: RecvStream,
        remote_addr: SocketAddr,
    ) {
        let mut channel = Channel::new(send, recv);
        let upgrade = async {
            let remote = secure_inbound(&mut channel, &self.security).await?;
            let (proposal, selected) =
                select_inbound(&mut channel, |p| self.handler_for(p)).await?;
            Ok::<_, UpgradeError>((remote, proposal, selected))
        };

        let outcome = tokio::time::timeout(self.config.dial_timeout, upgrade).await;
        match outcome {
            Err(_) => warn!(remote = %remote_addr, "Inbound stream upgrade timed out"),
            Ok(Err(UpgradeError::SecurityRejected(proposal))) => {
                warn!(remote = %remote_addr, proposal = %proposal, "Security protocol mismatch");
                let _ = channel.close().await;
            }
            Ok(Err(e)) => warn!(remote = %remote_addr, error = %e, "Inbound stream upgrade failed"),
            Ok(Ok((remote, proposal, None))) => {
                debug!(peer = %remote, protocol = %proposal, "No handler for protocol");
                let _ = channel.close().await;
            }
            Ok(Ok((remote, _, Some((protocol, handler))))) => {
                debug!(peer = %remote, protocol = %protocol, "Dispatching inbound stream");
                let stream = Stream::new(channel, self.identity.node_id, remote, protocol);
                handler.handle(stream, Arc::clone(&self.identity)).await;
            }
        }
    }
}

impl Drop for HostInner {
    fn drop(&mut self) {
        self.endpoint.close(VarInt::from_u32(0), b"host dropped");
    }
}

async fn accept_loop(
    host: Weak<HostInner>,
    endpoint: Endpoint,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let incoming = tokio::select! {
            _ = shutdown.changed() => break,
            incoming = endpoint.accept() => incoming,
        };
        let Some(incoming) = incoming else {
            break;
        };
        let host = host.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match incoming.await {
                Ok(conn) => {
                    debug!(remote = %conn.remote_address(), "Accepted connection");
                    serve_connection(host, conn, shutdown).await;
                }
                Err(e) => warn!(error = %e, "Failed to accept connection"),
            }
        });
    }
    debug!("Accept loop stopped");
}

/// Accepts streams the remote opens on `conn` until it closes or the host
/// shuts down.
async fn serve_connection(
    host: Weak<HostInner>,
    conn: quinn::Connection,
    mut shutdown: watch::Receiver<bool>,
) {
    let remote_addr = conn.remote_address();
    loop {
        let accepted = tokio::select! {
            _ = shutdown.changed() => break,
            accepted = conn.accept_bi() => accepted,
        };
        let (send, recv) = match accepted {
            Ok(streams) => streams,
            Err(ConnectionError::ApplicationClosed(_)) | Err(ConnectionError::LocallyClosed) => {
                debug!(remote = %remote_addr, "Connection closed");
                break;
            }
            Err(e) => {
                debug!(remote = %remote_addr, error = %e, "Connection ended");
                break;
            }
        };

        let Some(inner) = host.upgrade() else {
            break;
        };
        let Some(guard) = inner.drain_guard() else {
            drop(Channel::new(send, recv));
            break;
        };
        tokio::spawn(async move {
            inner.handle_inbound(send, recv, remote_addr).await;
            drop(guard);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::echo::{initiate, EchoHandler};
    use crate::transport::SecurityMode;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("strand_net=debug")
            .with_test_writer()
            .try_init();
    }

    async fn start(seed: u64, security: SecurityMode) -> Host {
        let keypair = Keypair::generate(Some(seed)).unwrap();
        let host = Host::start(HostConfig::local().with_security(security), keypair)
            .await
            .unwrap();
        host.register_handler(ProtocolId::echo(), Arc::new(EchoHandler::default()))
            .unwrap();
        host
    }

    #[tokio::test]
    async fn test_start_advertises_bound_address() {
        init_tracing();
        let host = start(1, SecurityMode::Noise).await;
        assert_eq!(host.state(), HostState::Listening);
        assert_eq!(host.peer_address().node_id(), host.node_id());
        assert_eq!(
            host.peer_address().transport().to_socket_addr(),
            Some(host.local_addr())
        );
        host.shutdown().await;
        assert_eq!(host.state(), HostState::Closed);
    }

    #[tokio::test]
    async fn test_bind_conflict() {
        let first = start(1, SecurityMode::Noise).await;
        let config = HostConfig::local().with_listen_addr(first.local_addr());
        let result = Host::start(config, Keypair::generate(Some(2)).unwrap()).await;
        assert!(matches!(result, Err(HostError::BindFailed { .. })));
    }

    #[tokio::test]
    async fn test_echo_round_trip() {
        init_tracing();
        for security in [SecurityMode::Noise, SecurityMode::Plaintext] {
            let x = start(42, security).await;
            let y = start(99, security).await;
            y.add_peer(PeerRecord::permanent(&x.peer_address()));

            let stream = y.open_stream(&x.node_id(), &ProtocolId::echo()).await.unwrap();
            let reply = initiate(stream, b"Hello, world!\n").await.unwrap();
            assert_eq!(reply, b"Hello, world!\n");
            assert_eq!(y.connection_count(), 1);

            y.shutdown().await;
            x.shutdown().await;
        }
    }

    #[tokio::test]
    async fn test_add_peer_sweeps_expired_records() {
        let host = start(5, SecurityMode::Noise).await;
        let stale = compose(
            &TransportAddress::quic("127.0.0.1:4001".parse().unwrap()),
            Keypair::generate(Some(6)).unwrap().node_id(),
        );
        host.add_peer(PeerRecord::new(
            stale.node_id(),
            stale.transport().clone(),
            crate::directory::Ttl::Expires(std::time::Duration::from_millis(10)),
        ));
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        assert_eq!(host.directory().len(), 1);

        let fresh = start(7, SecurityMode::Noise).await;
        host.add_peer(PeerRecord::permanent(&fresh.peer_address()));
        assert_eq!(host.directory().len(), 1);
        assert!(host.directory().get(&stale.node_id()).is_none());
    }

    #[tokio::test]
    async fn test_unknown_peer() {
        let host = start(3, SecurityMode::Noise).await;
        let stranger = Keypair::generate(Some(4)).unwrap().node_id();
        let result = host.open_stream(&stranger, &ProtocolId::echo()).await;
        assert!(matches!(result, Err(HostError::PeerUnknown(id)) if id == stranger));
        assert_eq!(host.connection_count(), 0);
    }
}
