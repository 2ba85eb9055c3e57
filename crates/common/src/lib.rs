/**
 * Multiaddr helpers: parsing listen addresses,
 *  converting to and from socket addresses, and
 *  splitting peer addresses into identity + transport.
 */
pub mod addr;
/**
 * Persisted repository configuration (config.toml).
 */
pub mod config;
/**
 * Cancellation context shared between the daemon
 *  and the node it builds.
 */
pub mod context;
/**
 * The running node and the builder that assembles it
 *  from a locked repository and a routing backend.
 */
pub mod node;
/**
 * On-disk repository: initialization and the exclusive
 *  lock that guards it.
 */
pub mod repo;
/**
 * Resolution of the configured routing mode into a
 *  concrete backend descriptor.
 */
pub mod routing;
/**
 * Helper for setting build version information
 *  at compile time.
 */
pub mod version;

pub mod prelude {
    pub use crate::addr::{Multiaddr, PeerAddr, PeerId};
    pub use crate::config::RepoConfig;
    pub use crate::context::{Canceller, Context};
    pub use crate::node::{BuildError, BuildFailure, Node, NodeBuilder};
    pub use crate::repo::{RepoError, RepositoryHandle};
    pub use crate::routing::{PeerInfo, RoutingBackend, RoutingError};
    pub use crate::version::build_info;
}
