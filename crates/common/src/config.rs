use std::fs;
use std::path::{Path, PathBuf};

use base64::prelude::*;
use libp2p_identity::{Keypair, PeerId};
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_ADDR: &str = "/ip4/127.0.0.1/tcp/5001";
pub const DEFAULT_GATEWAY_ADDR: &str = "/ip4/127.0.0.1/tcp/8080";
pub const DEFAULT_IPFS_MOUNT: &str = "/ipfs";
pub const DEFAULT_IPNS_MOUNT: &str = "/ipns";
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Contents of a repository's `config.toml`.
///
/// The daemon only ever reads this file; it is written once by `init`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoConfig {
    pub identity: Identity,
    pub addresses: Addresses,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub mounts: Mounts,
    #[serde(default)]
    pub supernode_routing: SupernodeRouting,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// base58 peer id derived from the key below
    pub peer_id: String,
    /// base64 of the protobuf-encoded keypair
    pub private_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Addresses {
    /// Multiaddr the control API listens on. Use port 0 for an ephemeral port.
    #[serde(default = "default_api_addr")]
    pub api: String,
    /// Multiaddr the public gateway listens on.
    /// When absent no gateway is started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub writable: bool,
    /// Where requests for `/` get redirected, if anywhere.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_redirect: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mounts {
    #[serde(default = "default_ipfs_mount")]
    pub ipfs: PathBuf,
    #[serde(default = "default_ipns_mount")]
    pub ipns: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupernodeRouting {
    /// Peer multiaddrs, each ending in `/p2p/<peer id>`.
    #[serde(default)]
    pub servers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Directory for rolling log files; stdout only when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

fn default_api_addr() -> String {
    DEFAULT_API_ADDR.to_string()
}

fn default_ipfs_mount() -> PathBuf {
    PathBuf::from(DEFAULT_IPFS_MOUNT)
}

fn default_ipns_mount() -> PathBuf {
    PathBuf::from(DEFAULT_IPNS_MOUNT)
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for Addresses {
    fn default() -> Self {
        Self {
            api: default_api_addr(),
            gateway: Some(DEFAULT_GATEWAY_ADDR.to_string()),
        }
    }
}

impl Default for Mounts {
    fn default() -> Self {
        Self {
            ipfs: default_ipfs_mount(),
            ipns: default_ipns_mount(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
        }
    }
}

impl Identity {
    /// Generate a fresh ed25519 identity.
    pub fn generate() -> Result<Self, ConfigError> {
        let keypair = Keypair::generate_ed25519();
        Self::from_keypair(&keypair)
    }

    pub fn from_keypair(keypair: &Keypair) -> Result<Self, ConfigError> {
        let encoded = keypair
            .to_protobuf_encoding()
            .map_err(|e| ConfigError::Identity(e.to_string()))?;
        Ok(Self {
            peer_id: keypair.public().to_peer_id().to_base58(),
            private_key: BASE64_STANDARD.encode(encoded),
        })
    }

    pub fn peer_id(&self) -> Result<PeerId, ConfigError> {
        self.peer_id
            .parse()
            .map_err(|e| ConfigError::Identity(format!("invalid peer id {:?}: {}", self.peer_id, e)))
    }

    /// Decode the keypair and check it matches the recorded peer id.
    pub fn keypair(&self) -> Result<Keypair, ConfigError> {
        let bytes = BASE64_STANDARD
            .decode(&self.private_key)
            .map_err(|e| ConfigError::Identity(format!("private key is not base64: {}", e)))?;
        let keypair = Keypair::from_protobuf_encoding(&bytes)
            .map_err(|e| ConfigError::Identity(format!("private key is malformed: {}", e)))?;

        let expected = self.peer_id()?;
        let derived = keypair.public().to_peer_id();
        if derived != expected {
            return Err(ConfigError::Identity(format!(
                "private key belongs to {}, not {}",
                derived, expected
            )));
        }
        Ok(keypair)
    }
}

impl RepoConfig {
    /// Default configuration around the given identity.
    pub fn with_identity(identity: Identity) -> Self {
        Self {
            identity,
            addresses: Addresses::default(),
            gateway: GatewayConfig::default(),
            mounts: Mounts::default(),
            supernode_routing: SupernodeRouting::default(),
            log: LogConfig::default(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let raw = toml::to_string_pretty(self)?;
        fs::write(path, raw)?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse config: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("could not serialize config: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("bad identity: {0}")]
    Identity(String),
}
