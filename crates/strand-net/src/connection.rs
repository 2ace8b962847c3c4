//! Connection management.
//!
//! A host keeps at most one outbound QUIC connection per peer and reuses it
//! for every stream it opens to that peer, as long as the connection is alive
//! and still points at the address the directory currently holds.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use quinn::VarInt;
use strand_core::NodeId;
use tracing::debug;

/// Unique connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    /// Generates a new unique connection ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

/// A cached outbound connection.
#[derive(Debug, Clone)]
pub(crate) struct PooledConnection {
    pub id: ConnectionId,
    pub remote: SocketAddr,
    pub established_at: Instant,
    pub conn: quinn::Connection,
}

impl PooledConnection {
    pub fn new(remote: SocketAddr, conn: quinn::Connection) -> Self {
        Self {
            id: ConnectionId::new(),
            remote,
            established_at: Instant::now(),
            conn,
        }
    }

    /// Returns true if the connection has not been closed or lost.
    pub fn is_alive(&self) -> bool {
        self.conn.close_reason().is_none()
    }
}

/// Outbound connections keyed by peer.
#[derive(Debug, Default)]
pub(crate) struct ConnectionPool {
    connections: Mutex<HashMap<NodeId, PooledConnection>>,
}

impl ConnectionPool {
    /// Returns a live connection to `peer` at `remote`.
    ///
    /// A dead connection, or one to a different address, is evicted.
    pub fn get(&self, peer: &NodeId, remote: SocketAddr) -> Option<quinn::Connection> {
        let mut connections = self.connections.lock();
        let entry = connections.get(peer)?;
        if entry.is_alive() && entry.remote == remote {
            return Some(entry.conn.clone());
        }
        debug!(
            peer = %peer,
            connection = entry.id.0,
            age_ms = entry.established_at.elapsed().as_millis() as u64,
            "Evicting stale connection"
        );
        if let Some(stale) = connections.remove(peer) {
            if stale.is_alive() {
                stale.conn.close(VarInt::from_u32(0), b"address changed");
            }
        }
        None
    }

    /// Stores a freshly dialed connection and returns the one to use.
    ///
    /// If a concurrent dial already stored a live connection to the same
    /// address, that one wins and the new connection is closed.
    pub fn insert(&self, peer: NodeId, connection: PooledConnection) -> quinn::Connection {
        let mut connections = self.connections.lock();
        if let Some(existing) = connections.get(&peer) {
            if existing.is_alive() && existing.remote == connection.remote {
                connection.conn.close(VarInt::from_u32(0), b"duplicate");
                return existing.conn.clone();
            }
        }
        let conn = connection.conn.clone();
        connections.insert(peer, connection);
        conn
    }

    /// Returns the number of live connections.
    pub fn live_count(&self) -> usize {
        self.connections
            .lock()
            .values()
            .filter(|c| c.is_alive())
            .count()
    }

    /// Closes and forgets every connection.
    pub fn close_all(&self, reason: &[u8]) {
        for (_, entry) in self.connections.lock().drain() {
            entry.conn.close(VarInt::from_u32(0), reason);
        }
    }
}
