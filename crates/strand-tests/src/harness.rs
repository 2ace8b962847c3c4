//! Test network harness for multi-node integration testing.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use strand_core::NodeId;
use tracing::info;

use crate::node::{TestNode, TestNodeConfig};

/// Installs a test-friendly tracing subscriber once per process.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "strand_tests=debug,strand_net=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

/// A test network containing multiple nodes.
#[derive(Default)]
pub struct TestNetwork {
    /// Nodes in the network
    nodes: Vec<Arc<TestNode>>,
    /// Node lookup by ID
    node_map: HashMap<NodeId, Arc<TestNode>>,
}

impl TestNetwork {
    /// Creates a new empty test network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a test network with `count` default nodes.
    pub async fn with_nodes(count: usize) -> Result<Self> {
        let mut network = Self::new();
        for _ in 0..count {
            network.add_node(TestNodeConfig::default()).await?;
        }
        Ok(network)
    }

    /// Starts a node and adds it to the network.
    pub async fn add_node(&mut self, config: TestNodeConfig) -> Result<Arc<TestNode>> {
        let node = Arc::new(TestNode::start(config).await?);
        let node_id = node.node_id;
        self.nodes.push(node.clone());
        self.node_map.insert(node_id, node.clone());

        info!(node_id = %node_id, total = self.nodes.len(), "Added node to test network");
        Ok(node)
    }

    /// Returns the number of nodes in the network.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns all nodes in the network.
    pub fn nodes(&self) -> &[Arc<TestNode>] {
        &self.nodes
    }

    /// Returns a node by index.
    pub fn node(&self, index: usize) -> Option<&Arc<TestNode>> {
        self.nodes.get(index)
    }

    /// Returns a node by ID.
    pub fn node_by_id(&self, id: &NodeId) -> Option<&Arc<TestNode>> {
        self.node_map.get(id)
    }

    /// Makes every node know every other node.
    pub fn introduce_all(&self) {
        for a in &self.nodes {
            for b in &self.nodes {
                if a.node_id != b.node_id {
                    a.learn(b);
                }
            }
        }
        info!(nodes = self.nodes.len(), "Introduced all nodes");
    }

    /// Returns total outbound connection count across all nodes.
    pub fn total_connections(&self) -> usize {
        self.nodes.iter().map(|n| n.connection_count()).sum()
    }

    /// Shuts every node down.
    pub async fn shutdown(&self) {
        for node in &self.nodes {
            node.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_network_creation() {
        let network = TestNetwork::new();
        assert_eq!(network.node_count(), 0);
    }

    #[tokio::test]
    async fn test_network_with_nodes() {
        let network = TestNetwork::with_nodes(3).await.unwrap();
        assert_eq!(network.node_count(), 3);
        let first = network.node(0).unwrap().node_id;
        assert!(network.node_by_id(&first).is_some());
    }

    #[tokio::test]
    async fn test_full_mesh_echo() {
        init_tracing();
        let network = TestNetwork::with_nodes(3).await.unwrap();
        network.introduce_all();

        for a in network.nodes() {
            for b in network.nodes() {
                if a.node_id == b.node_id {
                    continue;
                }
                let reply = a.echo(&b.node_id, b"mesh\n").await.unwrap();
                assert_eq!(reply, b"mesh\n");
            }
        }
        assert_eq!(network.total_connections(), 6);
        network.shutdown().await;
    }
}
