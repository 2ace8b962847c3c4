//! Peer directory.
//!
//! Maps node ids to the transport address they were last advertised at.
//! Records live in memory only; an expired record behaves as if it had never
//! been inserted.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use strand_core::NodeId;
use strand_proto::{PeerAddress, TransportAddress};
use tracing::debug;

/// How long a peer record stays valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Never expires (operator-supplied peers)
    Permanent,
    /// Expires this long after insertion
    Expires(Duration),
}

/// What a host knows about a peer.
#[derive(Debug, Clone)]
pub struct PeerRecord {
    /// Peer node id
    pub node_id: NodeId,
    /// Where to dial it
    pub address: TransportAddress,
    /// Validity
    pub ttl: Ttl,
    /// When the record was created
    pub inserted_at: Instant,
}

impl PeerRecord {
    /// Creates a record stamped with the current time.
    pub fn new(node_id: NodeId, address: TransportAddress, ttl: Ttl) -> Self {
        Self {
            node_id,
            address,
            ttl,
            inserted_at: Instant::now(),
        }
    }

    /// Creates a permanent record from a peer address.
    pub fn permanent(peer: &PeerAddress) -> Self {
        Self::new(peer.node_id(), peer.transport().clone(), Ttl::Permanent)
    }

    /// Returns true if the record has expired at `now`.
    pub fn is_expired(&self, now: Instant) -> bool {
        match self.ttl {
            Ttl::Permanent => false,
            Ttl::Expires(ttl) => now.saturating_duration_since(self.inserted_at) >= ttl,
        }
    }
}

/// In-memory peer records keyed by node id. Last write wins.
#[derive(Debug, Default)]
pub struct PeerDirectory {
    records: Mutex<HashMap<NodeId, PeerRecord>>,
}

impl PeerDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the record for `record.node_id`.
    pub fn insert(&self, record: PeerRecord) {
        debug!(peer = %record.node_id, address = %record.address, "Peer record stored");
        self.records.lock().insert(record.node_id, record);
    }

    /// Returns the unexpired record for `node_id`, evicting it if expired.
    pub fn get(&self, node_id: &NodeId) -> Option<PeerRecord> {
        let mut records = self.records.lock();
        if records.get(node_id)?.is_expired(Instant::now()) {
            records.remove(node_id);
            return None;
        }
        records.get(node_id).cloned()
    }

    /// Returns all unexpired records.
    pub fn snapshot(&self) -> Vec<PeerRecord> {
        let now = Instant::now();
        self.records
            .lock()
            .values()
            .filter(|r| !r.is_expired(now))
            .cloned()
            .collect()
    }

    /// Drops expired records, returning how many were removed.
    pub fn collect_garbage(&self) -> usize {
        let now = Instant::now();
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|_, r| !r.is_expired(now));
        before - records.len()
    }

    /// Returns the number of stored records, expired or not.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Returns true if no records are stored.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(seed: u8) -> NodeId {
        NodeId::from_public_key(&[seed; 32])
    }

    fn addr(port: u16) -> TransportAddress {
        TransportAddress::quic(([127, 0, 0, 1], port).into())
    }

    #[test]
    fn test_last_write_wins() {
        let dir = PeerDirectory::new();
        dir.insert(PeerRecord::new(node(1), addr(4001), Ttl::Permanent));
        dir.insert(PeerRecord::new(node(1), addr(4002), Ttl::Permanent));
        assert_eq!(dir.len(), 1);
        assert_eq!(dir.get(&node(1)).unwrap().address, addr(4002));
    }

    #[test]
    fn test_unknown_peer() {
        let dir = PeerDirectory::new();
        assert!(dir.get(&node(9)).is_none());
        assert!(dir.is_empty());
    }

    #[test]
    fn test_expired_record_is_absent() {
        let dir = PeerDirectory::new();
        let mut record = PeerRecord::new(node(1), addr(4001), Ttl::Expires(Duration::from_secs(5)));
        record.inserted_at = Instant::now() - Duration::from_secs(10);
        dir.insert(record);
        assert_eq!(dir.len(), 1);
        assert!(dir.get(&node(1)).is_none());
        assert_eq!(dir.len(), 0);
    }

    #[test]
    fn test_collect_garbage() {
        let dir = PeerDirectory::new();
        let mut stale = PeerRecord::new(node(1), addr(1), Ttl::Expires(Duration::from_millis(1)));
        stale.inserted_at = Instant::now() - Duration::from_secs(1);
        dir.insert(stale);
        dir.insert(PeerRecord::new(node(2), addr(2), Ttl::Expires(Duration::from_secs(3600))));
        dir.insert(PeerRecord::new(node(3), addr(3), Ttl::Permanent));

        assert_eq!(dir.snapshot().len(), 2);
        assert_eq!(dir.collect_garbage(), 1);
        assert_eq!(dir.len(), 2);
        assert!(dir.get(&node(2)).is_some());
    }

    #[test]
    fn test_permanent_from_peer_address() {
        let peer = strand_proto::compose(&addr(4001), node(4));
        let record = PeerRecord::permanent(&peer);
        assert_eq!(record.node_id, node(4));
        assert_eq!(record.ttl, Ttl::Permanent);
        assert!(!record.is_expired(Instant::now() + Duration::from_secs(1_000_000)));
    }
}
