//! Self-describing network addresses.
//!
//! Addresses are slash-separated lists of typed segments:
//! - `/ip4/<a.b.c.d>`, `/ip6/<addr>`, `/dns/<name>`, `/dns4/<name>`, `/dns6/<name>`
//! - `/tcp/<port>`, `/udp/<port>`, `/quic-v1`
//! - `/p2p/<node-id>`
//!
//! A [`TransportAddress`] is a host plus one transport (`tcp`, `udp` or
//! `udp` + `quic-v1`). A [`PeerAddress`] is a transport address followed by a
//! single trailing `/p2p/<node-id>` segment, e.g.
//! `/ip4/127.0.0.1/udp/4001/quic-v1/p2p/HiCu...`.
//!
//! Parsing only accepts canonical text, so rendering a parsed address always
//! reproduces the input exactly.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strand_core::NodeId;
use thiserror::Error;

/// Identity segment name.
pub const IDENTITY_SEGMENT: &str = "p2p";

/// Longest DNS name accepted.
const MAX_DNS_NAME_LEN: usize = 253;

/// Longest DNS label accepted.
const MAX_DNS_LABEL_LEN: usize = 63;

/// Error parsing or splitting addresses.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// Text is not a well-formed address
    #[error("Malformed address {input:?}: {reason}")]
    MalformedAddress {
        /// The rejected input
        input: String,
        /// What was wrong with it
        reason: String,
    },

    /// Address carries no trailing identity segment
    #[error("Address has no /p2p identity segment")]
    MissingIdentitySegment,

    /// Identity segment is not a valid node identifier
    #[error("Unknown identity encoding: {0}")]
    UnknownIdentityEncoding(String),
}

impl AddressError {
    fn malformed(input: impl Into<String>, reason: impl Into<String>) -> Self {
        AddressError::MalformedAddress {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

/// One typed address segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// IPv4 host
    Ip4(Ipv4Addr),
    /// IPv6 host
    Ip6(Ipv6Addr),
    /// DNS name resolving to any family
    Dns(String),
    /// DNS name resolving to IPv4
    Dns4(String),
    /// DNS name resolving to IPv6
    Dns6(String),
    /// TCP port
    Tcp(u16),
    /// UDP port
    Udp(u16),
    /// QUIC version 1 over the preceding UDP port
    QuicV1,
    /// Node identity
    P2p(NodeId),
}

impl Segment {
    /// Returns the segment's protocol name.
    pub fn name(&self) -> &'static str {
        match self {
            Segment::Ip4(_) => "ip4",
            Segment::Ip6(_) => "ip6",
            Segment::Dns(_) => "dns",
            Segment::Dns4(_) => "dns4",
            Segment::Dns6(_) => "dns6",
            Segment::Tcp(_) => "tcp",
            Segment::Udp(_) => "udp",
            Segment::QuicV1 => "quic-v1",
            Segment::P2p(_) => IDENTITY_SEGMENT,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Ip4(addr) => write!(f, "/ip4/{}", addr),
            Segment::Ip6(addr) => write!(f, "/ip6/{}", addr),
            Segment::Dns(name) => write!(f, "/dns/{}", name),
            Segment::Dns4(name) => write!(f, "/dns4/{}", name),
            Segment::Dns6(name) => write!(f, "/dns6/{}", name),
            Segment::Tcp(port) => write!(f, "/tcp/{}", port),
            Segment::Udp(port) => write!(f, "/udp/{}", port),
            Segment::QuicV1 => f.write_str("/quic-v1"),
            Segment::P2p(id) => write!(f, "/{}/{}", IDENTITY_SEGMENT, id),
        }
    }
}

/// An ordered list of address segments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Multiaddr {
    segments: Vec<Segment>,
}

impl Multiaddr {
    /// Creates an address from segments.
    pub fn from_segments(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    /// Parses canonical address text.
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let rest = input
            .strip_prefix('/')
            .ok_or_else(|| AddressError::malformed(input, "must start with '/'"))?;
        if rest.is_empty() {
            return Err(AddressError::malformed(input, "no segments"));
        }

        let mut parts = rest.split('/');
        let mut segments = Vec::new();
        while let Some(name) = parts.next() {
            if name.is_empty() {
                return Err(AddressError::malformed(input, "empty segment"));
            }
            let mut value = |what: &str| {
                parts
                    .next()
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| AddressError::malformed(input, format!("missing {} value", what)))
            };
            let segment = match name {
                "ip4" => Segment::Ip4(parse_ip4(input, value("ip4")?)?),
                "ip6" => Segment::Ip6(parse_ip6(input, value("ip6")?)?),
                "dns" => Segment::Dns(parse_dns(input, value("dns")?)?),
                "dns4" => Segment::Dns4(parse_dns(input, value("dns4")?)?),
                "dns6" => Segment::Dns6(parse_dns(input, value("dns6")?)?),
                "tcp" => Segment::Tcp(parse_port(input, value("tcp")?)?),
                "udp" => Segment::Udp(parse_port(input, value("udp")?)?),
                "quic-v1" => Segment::QuicV1,
                IDENTITY_SEGMENT => {
                    let text = value(IDENTITY_SEGMENT)?;
                    let id = NodeId::from_text(text)
                        .map_err(|e| AddressError::UnknownIdentityEncoding(format!("{}: {}", text, e)))?;
                    Segment::P2p(id)
                }
                other => {
                    return Err(AddressError::malformed(
                        input,
                        format!("unknown protocol family '{}'", other),
                    ))
                }
            };
            segments.push(segment);
        }
        Ok(Self { segments })
    }

    /// Returns the segments.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Returns true if the address has no segments.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Appends a segment.
    pub fn push(&mut self, segment: Segment) {
        self.segments.push(segment);
    }

    /// Returns this address followed by `other`.
    pub fn encapsulate(&self, other: &Multiaddr) -> Multiaddr {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Multiaddr { segments }
    }

    /// Returns the node identity in the trailing segment, if any.
    pub fn identity(&self) -> Option<NodeId> {
        match self.segments.last() {
            Some(Segment::P2p(id)) => Some(*id),
            _ => None,
        }
    }

    /// Returns this address without its trailing identity segment.
    pub fn decapsulate_identity(&self) -> Multiaddr {
        let mut segments = self.segments.clone();
        if matches!(segments.last(), Some(Segment::P2p(_))) {
            segments.pop();
        }
        Multiaddr { segments }
    }
}

impl fmt::Display for Multiaddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

impl FromStr for Multiaddr {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Multiaddr {
    type Error = AddressError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Multiaddr> for String {
    fn from(addr: Multiaddr) -> Self {
        addr.to_string()
    }
}

/// Host part of a transport address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Host {
    /// IPv4 literal
    Ip4(Ipv4Addr),
    /// IPv6 literal
    Ip6(Ipv6Addr),
    /// DNS name, any family
    Dns(String),
    /// DNS name, IPv4 only
    Dns4(String),
    /// DNS name, IPv6 only
    Dns6(String),
}

impl Host {
    fn segment(&self) -> Segment {
        match self {
            Host::Ip4(a) => Segment::Ip4(*a),
            Host::Ip6(a) => Segment::Ip6(*a),
            Host::Dns(n) => Segment::Dns(n.clone()),
            Host::Dns4(n) => Segment::Dns4(n.clone()),
            Host::Dns6(n) => Segment::Dns6(n.clone()),
        }
    }
}

impl From<IpAddr> for Host {
    fn from(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(a) => Host::Ip4(a),
            IpAddr::V6(a) => Host::Ip6(a),
        }
    }
}

/// Transport protocol of a transport address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportProtocol {
    /// Plain TCP
    Tcp,
    /// Plain UDP
    Udp,
    /// QUIC v1 over UDP
    QuicV1,
}

/// Network locator: host, transport protocol and port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TransportAddress {
    /// Host part
    pub host: Host,
    /// Transport protocol
    pub protocol: TransportProtocol,
    /// Port, never zero
    pub port: u16,
}

impl TransportAddress {
    /// Creates a transport address.
    pub fn new(host: Host, protocol: TransportProtocol, port: u16) -> Self {
        Self {
            host,
            protocol,
            port,
        }
    }

    /// Creates a QUIC transport address for a socket address.
    pub fn quic(addr: SocketAddr) -> Self {
        Self::from_socket_addr(addr, TransportProtocol::QuicV1)
    }

    /// Creates a transport address for a socket address.
    pub fn from_socket_addr(addr: SocketAddr, protocol: TransportProtocol) -> Self {
        Self::new(addr.ip().into(), protocol, addr.port())
    }

    /// Parses canonical transport address text.
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let addr = Multiaddr::parse(input)?;
        Self::from_segments(input, addr.segments())
    }

    fn from_segments(input: &str, segments: &[Segment]) -> Result<Self, AddressError> {
        if segments.iter().any(|s| matches!(s, Segment::P2p(_))) {
            return Err(AddressError::malformed(
                input,
                "transport address must not embed an identity segment",
            ));
        }
        let host = match segments.first() {
            Some(Segment::Ip4(a)) => Host::Ip4(*a),
            Some(Segment::Ip6(a)) => Host::Ip6(*a),
            Some(Segment::Dns(n)) => Host::Dns(n.clone()),
            Some(Segment::Dns4(n)) => Host::Dns4(n.clone()),
            Some(Segment::Dns6(n)) => Host::Dns6(n.clone()),
            _ => return Err(AddressError::malformed(input, "expected a host segment first")),
        };
        let (protocol, port) = match &segments[1..] {
            [Segment::Tcp(port)] => (TransportProtocol::Tcp, *port),
            [Segment::Udp(port)] => (TransportProtocol::Udp, *port),
            [Segment::Udp(port), Segment::QuicV1] => (TransportProtocol::QuicV1, *port),
            [] => return Err(AddressError::malformed(input, "missing transport segment")),
            _ => {
                return Err(AddressError::malformed(
                    input,
                    "expected tcp, udp or udp/quic-v1 after the host",
                ))
            }
        };
        Ok(Self::new(host, protocol, port))
    }

    /// Returns the address as segments.
    pub fn to_multiaddr(&self) -> Multiaddr {
        let mut segments = vec![self.host.segment()];
        match self.protocol {
            TransportProtocol::Tcp => segments.push(Segment::Tcp(self.port)),
            TransportProtocol::Udp => segments.push(Segment::Udp(self.port)),
            TransportProtocol::QuicV1 => {
                segments.push(Segment::Udp(self.port));
                segments.push(Segment::QuicV1);
            }
        }
        Multiaddr::from_segments(segments)
    }

    /// Returns the socket address for IP hosts, `None` for DNS hosts.
    pub fn to_socket_addr(&self) -> Option<SocketAddr> {
        match &self.host {
            Host::Ip4(a) => Some(SocketAddr::new(IpAddr::V4(*a), self.port)),
            Host::Ip6(a) => Some(SocketAddr::new(IpAddr::V6(*a), self.port)),
            _ => None,
        }
    }

    /// Resolves the address to a socket address, querying DNS if needed.
    pub async fn resolve(&self) -> std::io::Result<SocketAddr> {
        let (name, want_v4, want_v6) = match &self.host {
            Host::Ip4(a) => return Ok(SocketAddr::new(IpAddr::V4(*a), self.port)),
            Host::Ip6(a) => return Ok(SocketAddr::new(IpAddr::V6(*a), self.port)),
            Host::Dns(n) => (n.as_str(), true, true),
            Host::Dns4(n) => (n.as_str(), true, false),
            Host::Dns6(n) => (n.as_str(), false, true),
        };
        tokio::net::lookup_host((name, self.port))
            .await?
            .find(|a| (a.is_ipv4() && want_v4) || (a.is_ipv6() && want_v6))
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no matching address for {}", name),
                )
            })
    }
}

impl fmt::Display for TransportAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_multiaddr())
    }
}

impl FromStr for TransportAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TransportAddress {
    type Error = AddressError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<TransportAddress> for String {
    fn from(addr: TransportAddress) -> Self {
        addr.to_string()
    }
}

/// Dialable address: a transport address plus the node identity behind it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeerAddress {
    transport: TransportAddress,
    node_id: NodeId,
}

impl PeerAddress {
    /// Parses canonical peer address text.
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let (transport, node_id) = decompose(&Multiaddr::parse(input)?)?;
        Ok(Self { transport, node_id })
    }

    /// Returns the transport part.
    pub fn transport(&self) -> &TransportAddress {
        &self.transport
    }

    /// Returns the node identity.
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Returns the address as segments.
    pub fn to_multiaddr(&self) -> Multiaddr {
        let mut addr = self.transport.to_multiaddr();
        addr.push(Segment::P2p(self.node_id));
        addr
    }

    /// Splits into transport address and node identity.
    pub fn into_parts(self) -> (TransportAddress, NodeId) {
        (self.transport, self.node_id)
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_multiaddr())
    }
}

impl FromStr for PeerAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PeerAddress {
    type Error = AddressError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<PeerAddress> for String {
    fn from(addr: PeerAddress) -> Self {
        addr.to_string()
    }
}

/// Joins a transport address and a node identity into a peer address.
pub fn compose(transport: &TransportAddress, node_id: NodeId) -> PeerAddress {
    PeerAddress {
        transport: transport.clone(),
        node_id,
    }
}

/// Splits an address ending in `/p2p/<id>` into its transport and identity.
pub fn decompose(addr: &Multiaddr) -> Result<(TransportAddress, NodeId), AddressError> {
    let node_id = addr.identity().ok_or(AddressError::MissingIdentitySegment)?;
    let segments = &addr.segments()[..addr.segments().len() - 1];
    let transport = TransportAddress::from_segments(&addr.to_string(), segments)?;
    Ok((transport, node_id))
}

fn parse_ip4(input: &str, text: &str) -> Result<Ipv4Addr, AddressError> {
    let addr: Ipv4Addr = text
        .parse()
        .map_err(|_| AddressError::malformed(input, format!("invalid ip4 '{}'", text)))?;
    if addr.to_string() != text {
        return Err(AddressError::malformed(input, format!("non-canonical ip4 '{}'", text)));
    }
    Ok(addr)
}

fn parse_ip6(input: &str, text: &str) -> Result<Ipv6Addr, AddressError> {
    let addr: Ipv6Addr = text
        .parse()
        .map_err(|_| AddressError::malformed(input, format!("invalid ip6 '{}'", text)))?;
    if addr.to_string() != text {
        return Err(AddressError::malformed(input, format!("non-canonical ip6 '{}'", text)));
    }
    Ok(addr)
}

fn parse_dns(input: &str, text: &str) -> Result<String, AddressError> {
    let invalid = |why: &str| AddressError::malformed(input, format!("invalid dns name '{}': {}", text, why));
    if text.len() > MAX_DNS_NAME_LEN {
        return Err(invalid("too long"));
    }
    for label in text.split('.') {
        if label.is_empty() || label.len() > MAX_DNS_LABEL_LEN {
            return Err(invalid("bad label length"));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(invalid("label starts or ends with '-'"));
        }
        if !label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-') {
            return Err(invalid("unexpected character"));
        }
    }
    Ok(text.to_string())
}

fn parse_port(input: &str, text: &str) -> Result<u16, AddressError> {
    if !text.bytes().all(|b| b.is_ascii_digit()) || (text.len() > 1 && text.starts_with('0')) {
        return Err(AddressError::malformed(input, format!("non-canonical port '{}'", text)));
    }
    match text.parse::<u16>() {
        Ok(0) | Err(_) => Err(AddressError::malformed(
            input,
            format!("port '{}' outside 1-65535", text),
        )),
        Ok(port) => Ok(port),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(seed: u8) -> NodeId {
        NodeId::from_public_key(&[seed; 32])
    }

    #[test]
    fn test_transport_render_parse() {
        for text in [
            "/ip4/127.0.0.1/udp/4001/quic-v1",
            "/ip4/10.0.0.1/tcp/80",
            "/ip6/::1/udp/9000",
            "/ip6/2001:db8::ff00:42:8329/udp/65535/quic-v1",
            "/dns/example.com/tcp/443",
            "/dns4/node-1.example.org/udp/1/quic-v1",
            "/dns6/localhost/tcp/8080",
        ] {
            let addr = TransportAddress::parse(text).unwrap();
            assert_eq!(addr.to_string(), text);
        }
    }

    #[test]
    fn test_transport_fields() {
        let addr: TransportAddress = "/ip4/127.0.0.1/udp/4001/quic-v1".parse().unwrap();
        assert_eq!(addr.host, Host::Ip4(Ipv4Addr::LOCALHOST));
        assert_eq!(addr.protocol, TransportProtocol::QuicV1);
        assert_eq!(addr.port, 4001);
        assert_eq!(addr.to_socket_addr(), Some("127.0.0.1:4001".parse().unwrap()));
    }

    #[test]
    fn test_rejects_bad_ports() {
        for text in [
            "/ip4/127.0.0.1/tcp/0",
            "/ip4/127.0.0.1/tcp/65536",
            "/ip4/127.0.0.1/tcp/080",
            "/ip4/127.0.0.1/tcp/-1",
            "/ip4/127.0.0.1/tcp/+80",
        ] {
            assert!(
                matches!(TransportAddress::parse(text), Err(AddressError::MalformedAddress { .. })),
                "{} should be rejected",
                text
            );
        }
    }

    #[test]
    fn test_rejects_unknown_family() {
        let err = TransportAddress::parse("/ipx/1.2.3.4/tcp/1").unwrap_err();
        assert!(err.to_string().contains("unknown protocol family"));
        assert!(TransportAddress::parse("/ip4/1.2.3.4/sctp/1").is_err());
    }

    #[test]
    fn test_rejects_non_canonical() {
        for text in [
            "",
            "ip4/1.2.3.4/tcp/1",
            "/",
            "/ip4/1.2.3.4/tcp/1/",
            "/ip4//tcp/1",
            "/ip4/01.2.3.4/tcp/1",
            "/ip6/0:0:0:0:0:0:0:1/tcp/1",
            "/ip6/::FFFF/tcp/1",
            "/dns/-bad.com/tcp/1",
            "/dns/a..b/tcp/1",
            "/ip4/1.2.3.4",
            "/ip4/1.2.3.4/tcp/1/quic-v1",
            "/ip4/1.2.3.4/udp/1/quic-v1/quic-v1",
            "/tcp/1",
        ] {
            assert!(TransportAddress::parse(text).is_err(), "{:?} should be rejected", text);
        }
    }

    #[test]
    fn test_transport_rejects_identity() {
        let text = format!("/ip4/127.0.0.1/udp/4001/quic-v1/p2p/{}", node(1));
        assert!(matches!(
            TransportAddress::parse(&text),
            Err(AddressError::MalformedAddress { .. })
        ));
    }

    #[test]
    fn test_compose_decompose() {
        let transport = TransportAddress::parse("/ip4/127.0.0.1/udp/4001/quic-v1").unwrap();
        let peer = compose(&transport, node(5));
        let (t, n) = decompose(&peer.to_multiaddr()).unwrap();
        assert_eq!(t, transport);
        assert_eq!(n, node(5));

        let text = peer.to_string();
        assert_eq!(text, format!("/ip4/127.0.0.1/udp/4001/quic-v1/p2p/{}", node(5)));
        assert_eq!(PeerAddress::parse(&text).unwrap(), peer);
    }

    #[test]
    fn test_decompose_missing_identity() {
        let addr = Multiaddr::parse("/ip4/127.0.0.1/udp/4001/quic-v1").unwrap();
        assert_eq!(decompose(&addr), Err(AddressError::MissingIdentitySegment));
        assert_eq!(
            PeerAddress::parse("/ip4/127.0.0.1/tcp/1"),
            Err(AddressError::MissingIdentitySegment)
        );
    }

    #[test]
    fn test_decompose_bad_identity() {
        let err = PeerAddress::parse("/ip4/127.0.0.1/tcp/1/p2p/QmNotAStrandId").unwrap_err();
        assert!(matches!(err, AddressError::UnknownIdentityEncoding(_)));
    }

    #[test]
    fn test_decompose_identity_not_last() {
        let text = format!("/p2p/{}/ip4/127.0.0.1/tcp/1/p2p/{}", node(1), node(2));
        assert!(matches!(
            PeerAddress::parse(&text),
            Err(AddressError::MalformedAddress { .. })
        ));
    }

    #[test]
    fn test_encapsulate_decapsulate() {
        let transport = Multiaddr::parse("/dns4/example.com/udp/4001/quic-v1").unwrap();
        let identity = Multiaddr::from_segments(vec![Segment::P2p(node(9))]);
        let full = transport.encapsulate(&identity);
        assert_eq!(full.identity(), Some(node(9)));
        assert_eq!(full.decapsulate_identity(), transport);
        assert_eq!(transport.decapsulate_identity(), transport);
        assert_eq!(transport.identity(), None);
    }

    #[test]
    fn test_serde_as_string() {
        #[derive(Deserialize)]
        struct Wrapper {
            addr: TransportAddress,
        }
        let w: Wrapper = from_map("/ip6/::1/tcp/7");
        assert_eq!(w.addr.port, 7);

        fn from_map(addr: &str) -> Wrapper {
            use serde::de::value::{Error, MapDeserializer};
            let map = vec![("addr", addr.to_string())];
            Wrapper::deserialize(MapDeserializer::<_, Error>::new(map.into_iter())).unwrap()
        }
    }

    #[tokio::test]
    async fn test_resolve_ip_literal() {
        let addr = TransportAddress::parse("/ip4/127.0.0.1/udp/9/quic-v1").unwrap();
        assert_eq!(addr.resolve().await.unwrap(), "127.0.0.1:9".parse().unwrap());
    }

    #[tokio::test]
    async fn test_resolve_localhost() {
        let addr = TransportAddress::parse("/dns4/localhost/udp/9/quic-v1").unwrap();
        let resolved = addr.resolve().await.unwrap();
        assert!(resolved.is_ipv4());
        assert_eq!(resolved.port(), 9);
    }
}
