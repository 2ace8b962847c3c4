//! Strand Network - node host and stream layer.
//!
//! - QUIC endpoint (listen and dial on one socket)
//! - Per-stream security upgrade: Noise XX or plaintext
//! - Protocol negotiation and handler dispatch
//! - Peer directory with TTLs
//! - The `/echo/1.0.0` protocol

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod connection;
pub mod directory;
pub mod echo;
pub mod handler;
pub mod host;
pub mod noise;
pub mod quic;
pub mod stream;
pub mod transport;
mod upgrade;

pub use connection::ConnectionId;
pub use directory::{PeerDirectory, PeerRecord, Ttl};
pub use echo::{initiate, EchoConfig, EchoError, EchoHandler};
pub use handler::{HostIdentity, ProtocolHandler};
pub use host::{Host, HostError, HostState};
pub use noise::{NoiseError, NoiseIdentity};
pub use stream::{Stream, StreamError};
pub use transport::{HostConfig, SecurityMode, TransportError};
