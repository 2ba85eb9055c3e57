use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

pub use libp2p_identity::PeerId;
pub use multiaddr::{Multiaddr, Protocol};

#[derive(Debug, thiserror::Error)]
pub enum AddrError {
    #[error("invalid multiaddr {addr:?}: {source}")]
    Parse {
        addr: String,
        #[source]
        source: multiaddr::Error,
    },
    #[error("unsupported listen address {0}: expected /ip4 or /ip6 followed by /tcp")]
    UnsupportedTransport(Multiaddr),
    #[error("peer address {0} does not end with a /p2p peer id")]
    MissingPeerId(Multiaddr),
    #[error("peer address {0} has no transport part")]
    MissingTransport(Multiaddr),
}

/// Parse a textual multiaddr, keeping the original string in the error.
pub fn parse_multiaddr(addr: &str) -> Result<Multiaddr, AddrError> {
    Multiaddr::from_str(addr.trim()).map_err(|source| AddrError::Parse {
        addr: addr.to_string(),
        source,
    })
}

/// Convert a `/ip{4,6}/<ip>/tcp/<port>` multiaddr into a socket address.
///
/// Anything else (dns names, udp, trailing protocols) can't be bound
/// directly and is rejected.
pub fn to_socket_addr(addr: &Multiaddr) -> Result<SocketAddr, AddrError> {
    let mut iter = addr.iter();
    let ip: IpAddr = match iter.next() {
        Some(Protocol::Ip4(ip)) => ip.into(),
        Some(Protocol::Ip6(ip)) => ip.into(),
        _ => return Err(AddrError::UnsupportedTransport(addr.clone())),
    };
    let port = match iter.next() {
        Some(Protocol::Tcp(port)) => port,
        _ => return Err(AddrError::UnsupportedTransport(addr.clone())),
    };
    if iter.next().is_some() {
        return Err(AddrError::UnsupportedTransport(addr.clone()));
    }
    Ok(SocketAddr::new(ip, port))
}

/// Inverse of [`to_socket_addr`].
pub fn from_socket_addr(addr: SocketAddr) -> Multiaddr {
    let ip = match addr.ip() {
        IpAddr::V4(ip) => Protocol::Ip4(ip),
        IpAddr::V6(ip) => Protocol::Ip6(ip),
    };
    Multiaddr::empty().with(ip).with(Protocol::Tcp(addr.port()))
}

/// A multiaddr that names both where a peer is reachable and who it is,
/// e.g. `/ip4/127.0.0.1/tcp/4001/p2p/Qm...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerAddr {
    id: PeerId,
    transport: Multiaddr,
}

impl PeerAddr {
    pub fn new(id: PeerId, transport: Multiaddr) -> Self {
        Self { id, transport }
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn transport(&self) -> &Multiaddr {
        &self.transport
    }
}

impl TryFrom<Multiaddr> for PeerAddr {
    type Error = AddrError;

    fn try_from(addr: Multiaddr) -> Result<Self, Self::Error> {
        let mut transport = addr.clone();
        let id = match transport.pop() {
            Some(Protocol::P2p(id)) => id,
            _ => return Err(AddrError::MissingPeerId(addr)),
        };
        if transport.is_empty() {
            return Err(AddrError::MissingTransport(addr));
        }
        Ok(Self { id, transport })
    }
}

impl FromStr for PeerAddr {
    type Err = AddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_multiaddr(s)?.try_into()
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/p2p/{}", self.transport, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEER: &str = "QmNnooDu7bfjPFoTZYxMNLWUQJyrVwtbZg5gBMjTezGAJN";

    #[test]
    fn test_socket_addr_round_trip_ip4() {
        let addr = parse_multiaddr("/ip4/127.0.0.1/tcp/5001").unwrap();
        let socket = to_socket_addr(&addr).unwrap();
        assert_eq!(socket, "127.0.0.1:5001".parse().unwrap());
        assert_eq!(from_socket_addr(socket), addr);
    }

    #[test]
    fn test_socket_addr_ip6() {
        let addr = parse_multiaddr("/ip6/::1/tcp/0").unwrap();
        let socket = to_socket_addr(&addr).unwrap();
        assert!(socket.is_ipv6());
        assert_eq!(socket.port(), 0);
    }

    #[test]
    fn test_socket_addr_rejects_non_tcp() {
        let addr = parse_multiaddr("/ip4/127.0.0.1/udp/5001").unwrap();
        assert!(matches!(
            to_socket_addr(&addr),
            Err(AddrError::UnsupportedTransport(_))
        ));

        let addr = parse_multiaddr("/dns4/example.com/tcp/80").unwrap();
        assert!(to_socket_addr(&addr).is_err());
    }

    #[test]
    fn test_parse_garbage() {
        let err = parse_multiaddr("127.0.0.1:5001").unwrap_err();
        assert!(err.to_string().contains("127.0.0.1:5001"));
    }

    #[test]
    fn test_peer_addr_splits_identity() {
        let peer: PeerAddr = format!("/ip4/127.0.0.1/tcp/4001/p2p/{}", PEER)
            .parse()
            .unwrap();
        assert_eq!(peer.id().to_string(), PEER);
        assert_eq!(peer.transport().to_string(), "/ip4/127.0.0.1/tcp/4001");
    }

    #[test]
    fn test_peer_addr_accepts_legacy_ipfs_tag() {
        let peer: PeerAddr = format!("/ip4/10.0.0.1/tcp/4002/ipfs/{}", PEER)
            .parse()
            .unwrap();
        assert_eq!(peer.id().to_string(), PEER);
    }

    #[test]
    fn test_peer_addr_requires_id_and_transport() {
        let err = "/ip4/127.0.0.1/tcp/4001".parse::<PeerAddr>().unwrap_err();
        assert!(matches!(err, AddrError::MissingPeerId(_)));

        let err = format!("/p2p/{}", PEER).parse::<PeerAddr>().unwrap_err();
        assert!(matches!(err, AddrError::MissingTransport(_)));
    }
}
