//! Integration and end-to-end tests for Strand.
//!
//! This crate provides:
//! - A multi-node test harness for spinning up local hosts
//! - End-to-end tests for the echo exchange, host lifecycle and addressing

pub mod harness;
pub mod node;

pub use harness::{init_tracing, TestNetwork};
pub use node::{TestNode, TestNodeConfig};
