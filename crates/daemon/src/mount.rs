//! Filesystem mounts for the `/ipfs` and `/ipns` namespaces.
//!
//! Mounting happens synchronously during startup, after the HTTP services
//! are up. Unmounting is registered as node close hooks so it runs after
//! every service has stopped. Mount failures are not reported through the
//! service error signals; they abort startup directly.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::config::Mounts;
use common::node::Node;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Ipfs,
    Ipns,
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ipfs => write!(f, "IPFS"),
            Self::Ipns => write!(f, "IPNS"),
        }
    }
}

/// Something that can expose a namespace of the node as a directory.
pub trait FilesystemDriver: Send + Sync {
    fn mount(&self, node: &Node, namespace: Namespace, mountpoint: &Path)
        -> Result<(), MountError>;

    fn unmount(&self, namespace: Namespace, mountpoint: &Path) -> Result<(), MountError>;
}

/// Driver used when the binary was built without filesystem support.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableDriver;

impl FilesystemDriver for UnavailableDriver {
    fn mount(&self, _node: &Node, _namespace: Namespace, _mountpoint: &Path) -> Result<(), MountError> {
        Err(MountError::Unsupported)
    }

    fn unmount(&self, _namespace: Namespace, _mountpoint: &Path) -> Result<(), MountError> {
        Ok(())
    }
}

/// Where each namespace gets mounted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPaths {
    pub ipfs: PathBuf,
    pub ipns: PathBuf,
}

impl MountPaths {
    /// Command line overrides win over the repository configuration.
    pub fn resolve(ipfs: Option<PathBuf>, ipns: Option<PathBuf>, configured: &Mounts) -> Self {
        Self {
            ipfs: ipfs.unwrap_or_else(|| configured.ipfs.clone()),
            ipns: ipns.unwrap_or_else(|| configured.ipns.clone()),
        }
    }
}

/// Mount both namespaces, or neither.
///
/// If the second mount fails the first is rolled back before returning.
/// On success the node unmounts both when it closes.
pub fn mount(
    node: &Node,
    driver: Arc<dyn FilesystemDriver>,
    paths: &MountPaths,
) -> Result<(), MountError> {
    check_mountpoint(&paths.ipfs)?;
    check_mountpoint(&paths.ipns)?;

    driver.mount(node, Namespace::Ipfs, &paths.ipfs)?;
    if let Err(e) = driver.mount(node, Namespace::Ipns, &paths.ipns) {
        if let Err(undo) = driver.unmount(Namespace::Ipfs, &paths.ipfs) {
            tracing::warn!(
                mountpoint = %paths.ipfs.display(),
                "failed to roll back IPFS mount: {}",
                undo
            );
        }
        return Err(e);
    }

    for (namespace, mountpoint) in [
        (Namespace::Ipfs, paths.ipfs.clone()),
        (Namespace::Ipns, paths.ipns.clone()),
    ] {
        let driver = driver.clone();
        node.on_close(format!("unmount {}", namespace), move || {
            match driver.unmount(namespace, &mountpoint) {
                Ok(()) => tracing::info!(mountpoint = %mountpoint.display(), "{} unmounted", namespace),
                Err(e) => tracing::warn!(mountpoint = %mountpoint.display(), "{} unmount failed: {}", namespace, e),
            }
        });
    }

    Ok(())
}

fn check_mountpoint(path: &Path) -> Result<(), MountError> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(MountError::NotADirectory(path.to_path_buf())),
        Err(_) => Err(MountError::MissingMountpoint(path.to_path_buf())),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MountError {
    #[error("mountpoint {} does not exist", .0.display())]
    MissingMountpoint(PathBuf),

    #[error("mountpoint {} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("filesystem mounting is not supported by this build")]
    Unsupported,

    #[error("failed to mount {namespace} at {}: {reason}", .mountpoint.display())]
    Driver {
        namespace: Namespace,
        mountpoint: PathBuf,
        reason: String,
    },
}
