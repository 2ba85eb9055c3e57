use std::fmt;

use crate::addr::{AddrError, Multiaddr, PeerAddr, PeerId};
use crate::config::RepoConfig;

pub const ROUTING_OPTION_DHT: &str = "dht";
pub const ROUTING_OPTION_SUPERNODE: &str = "supernode";

/// A routing peer: who it is and where to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    id: PeerId,
    addrs: Vec<Multiaddr>,
}

impl PeerInfo {
    /// A peer needs at least one address to be of any use for routing.
    pub fn new(id: PeerId, addrs: Vec<Multiaddr>) -> Result<Self, RoutingError> {
        if addrs.is_empty() {
            return Err(RoutingError::PeerWithoutAddress(id));
        }
        Ok(Self { id, addrs })
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn addrs(&self) -> &[Multiaddr] {
        &self.addrs
    }
}

impl From<PeerAddr> for PeerInfo {
    fn from(addr: PeerAddr) -> Self {
        Self {
            id: addr.id(),
            addrs: vec![addr.transport().clone()],
        }
    }
}

/// How the node finds content and peers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RoutingBackend {
    /// No override: the node uses its standard DHT discovery.
    #[default]
    Default,
    /// Route exclusively through a fixed, ordered set of peers.
    FixedPeerSet(Vec<PeerInfo>),
}

impl RoutingBackend {
    /// Resolve the `--routing` option against the repository config.
    ///
    /// `"supernode"` builds a [`RoutingBackend::FixedPeerSet`] from
    /// `supernode_routing.servers`; a single malformed server address fails
    /// the whole selection. Any other value, including an empty or
    /// unrecognized one, selects [`RoutingBackend::Default`].
    pub fn select(option: &str, config: &RepoConfig) -> Result<Self, RoutingError> {
        match option {
            ROUTING_OPTION_SUPERNODE => {
                let servers = &config.supernode_routing.servers;
                if servers.is_empty() {
                    return Err(RoutingError::NoSupernodes);
                }

                let peers = servers
                    .iter()
                    .map(|server| {
                        server
                            .parse::<PeerAddr>()
                            .map(PeerInfo::from)
                            .map_err(|source| RoutingError::InvalidPeerAddress {
                                addr: server.clone(),
                                source,
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()?;

                tracing::info!(peers = peers.len(), "using supernode routing");
                Ok(Self::FixedPeerSet(peers))
            }
            "" | ROUTING_OPTION_DHT => Ok(Self::Default),
            other => {
                tracing::warn!(
                    option = other,
                    "unrecognized routing option, falling back to default routing"
                );
                Ok(Self::Default)
            }
        }
    }

    pub fn mode(&self) -> &'static str {
        match self {
            Self::Default => ROUTING_OPTION_DHT,
            Self::FixedPeerSet(_) => ROUTING_OPTION_SUPERNODE,
        }
    }

    pub fn peers(&self) -> &[PeerInfo] {
        match self {
            Self::Default => &[],
            Self::FixedPeerSet(peers) => peers,
        }
    }
}

impl fmt::Display for RoutingBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "{}", ROUTING_OPTION_DHT),
            Self::FixedPeerSet(peers) => {
                write!(f, "{} ({} peers)", ROUTING_OPTION_SUPERNODE, peers.len())
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    #[error("invalid supernode address {addr:?}: {source}")]
    InvalidPeerAddress {
        addr: String,
        #[source]
        source: AddrError,
    },

    #[error("peer {0} has no addresses")]
    PeerWithoutAddress(PeerId),

    #[error("supernode routing selected but supernode_routing.servers is empty")]
    NoSupernodes,
}
