//! Application protocol identifiers.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

use crate::negotiation::MAX_MESSAGE_LEN;

/// Longest protocol identifier; its negotiation frame adds a newline.
pub const MAX_PROTOCOL_ID_LEN: usize = MAX_MESSAGE_LEN - 1;

/// Protocol spoken by the echo handler.
pub const ECHO_PROTOCOL: &str = "/echo/1.0.0";

/// Error constructing a protocol identifier.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Invalid protocol id {id:?}: {reason}")]
pub struct InvalidProtocolId {
    /// The rejected identifier
    pub id: String,
    /// Why it was rejected
    pub reason: &'static str,
}

/// Immutable tag selecting the handler for a stream, e.g. `/echo/1.0.0`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProtocolId(Arc<str>);

impl ProtocolId {
    /// Validates and wraps a protocol identifier.
    pub fn new(id: impl Into<String>) -> Result<Self, InvalidProtocolId> {
        let id = id.into();
        let reason = if !id.starts_with('/') {
            Some("must start with '/'")
        } else if id.len() == 1 {
            Some("empty after '/'")
        } else if id.contains('\n') {
            Some("contains a newline")
        } else if id.len() > MAX_PROTOCOL_ID_LEN {
            Some("too long")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(InvalidProtocolId { id, reason }),
            None => Ok(Self(id.into())),
        }
    }

    /// Returns the echo protocol identifier.
    pub fn echo() -> Self {
        Self(Arc::from(ECHO_PROTOCOL))
    }

    /// Returns the identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProtocolId({})", self.0)
    }
}

impl fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ProtocolId {
    type Err = InvalidProtocolId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for ProtocolId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
