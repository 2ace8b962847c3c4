//! Strand Protocol - Addressing and negotiation wire formats.
//!
//! This crate defines:
//! - Self-describing addresses (`Multiaddr`, `TransportAddress`, `PeerAddress`)
//! - Application protocol identifiers
//! - Multistream negotiation framing used to upgrade streams

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod multiaddr;
pub mod negotiation;
pub mod protocol;

pub use multiaddr::{
    compose, decompose, AddressError, Host, Multiaddr, PeerAddress, Segment, TransportAddress,
    TransportProtocol,
};
pub use negotiation::{Answer, NegotiationError};
pub use protocol::{InvalidProtocolId, ProtocolId, ECHO_PROTOCOL, MAX_PROTOCOL_ID_LEN};
