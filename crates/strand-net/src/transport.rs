//! Host configuration and transport errors.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use strand_proto::negotiation::{NOISE_PROTOCOL, PLAINTEXT_PROTOCOL};
use thiserror::Error;

/// Errors setting up the QUIC endpoint.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Certificate generation or TLS configuration failed
    #[error("TLS configuration error: {0}")]
    Tls(String),

    /// Transport parameters are out of range
    #[error("Invalid transport parameter: {0}")]
    InvalidParameter(String),

    /// Binding the UDP socket failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Secure-channel layer applied to every stream.
///
/// Both ends must use the same mode; a mismatch fails the stream upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecurityMode {
    /// Noise XX handshake authenticating both identities
    #[default]
    Noise,
    /// No encryption; identities are exchanged but not proven
    Plaintext,
}

impl SecurityMode {
    /// Returns the negotiation identifier for this mode.
    pub fn protocol(&self) -> &'static str {
        match self {
            SecurityMode::Noise => NOISE_PROTOCOL,
            SecurityMode::Plaintext => PLAINTEXT_PROTOCOL,
        }
    }
}

/// Host configuration.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Listen address; port 0 picks an ephemeral port
    pub listen_addr: SocketAddr,
    /// Secure-channel layer
    pub security: SecurityMode,
    /// Bound on dialing plus stream upgrade
    pub dial_timeout: Duration,
    /// Idle connection timeout
    pub idle_timeout: Duration,
    /// Keep-alive interval for open connections
    pub keep_alive: Duration,
    /// How long shutdown waits for in-flight handlers
    pub drain_timeout: Duration,
}

impl HostConfig {
    /// Returns a configuration listening on loopback with an ephemeral port.
    pub fn local() -> Self {
        Self::default()
    }

    /// Sets the listen address.
    pub fn with_listen_addr(mut self, addr: SocketAddr) -> Self {
        self.listen_addr = addr;
        self
    }

    /// Sets the security mode.
    pub fn with_security(mut self, security: SecurityMode) -> Self {
        self.security = security;
        self
    }

    /// Sets the dial and upgrade timeout.
    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    /// Sets how long shutdown waits for in-flight handlers.
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0),
            security: SecurityMode::Noise,
            dial_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(60),
            keep_alive: Duration::from_secs(15),
            drain_timeout: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HostConfig::default();
        assert!(config.listen_addr.ip().is_loopback());
        assert_eq!(config.listen_addr.port(), 0);
        assert_eq!(config.security, SecurityMode::Noise);
        assert!(config.keep_alive < config.idle_timeout);
    }

    #[test]
    fn test_security_protocols() {
        assert_eq!(SecurityMode::Noise.protocol(), "/noise");
        assert_eq!(SecurityMode::Plaintext.protocol(), "/plaintext/2.0.0");
        let config = HostConfig::local().with_security(SecurityMode::Plaintext);
        assert_eq!(config.security, SecurityMode::Plaintext);
    }
}
