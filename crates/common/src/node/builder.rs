use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::watch;

use super::{Node, NodeInner, FINAL_SHUTDOWN_TIMEOUT};
use crate::config::ConfigError;
use crate::context::Context;
use crate::repo::RepositoryHandle;
use crate::routing::RoutingBackend;

/// Assembles a [`Node`] from a locked repository.
///
/// The builder owns the repository handle. If `build` fails the handle
/// comes back inside the [`BuildFailure`] and the caller is responsible
/// for releasing it; on success it belongs to the node.
pub struct NodeBuilder {
    repo: RepositoryHandle,
    routing: RoutingBackend,
    online: bool,
    context: Option<Context>,
    shutdown_timeout: Duration,
}

impl NodeBuilder {
    pub fn new(repo: RepositoryHandle) -> Self {
        Self {
            repo,
            routing: RoutingBackend::Default,
            online: false,
            context: None,
            shutdown_timeout: FINAL_SHUTDOWN_TIMEOUT,
        }
    }

    /// Join the network. Offline nodes are not supported by this builder.
    pub fn online(mut self) -> Self {
        self.online = true;
        self
    }

    pub fn routing(mut self, routing: RoutingBackend) -> Self {
        self.routing = routing;
        self
    }

    /// Tie the node to a cancellation context: once the context is done the
    /// node raises its shutdown signal and its services wind down.
    pub fn context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }

    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub async fn build(self) -> Result<Node, BuildFailure> {
        let Self {
            repo,
            routing,
            online,
            context,
            shutdown_timeout,
        } = self;

        if !online {
            return Err(BuildFailure::new(BuildError::Offline, repo));
        }

        let id = match repo.config().identity.keypair() {
            Ok(keypair) => keypair.public().to_peer_id(),
            Err(e) => return Err(BuildFailure::new(BuildError::Identity(e), repo)),
        };

        let (shutdown, _) = watch::channel(false);
        let inner = Arc::new(NodeInner {
            id,
            repo_path: repo.path().to_path_buf(),
            config: repo.config().clone(),
            routing,
            started_at: Instant::now(),
            shutdown_timeout,
            repo: Mutex::new(Some(repo)),
            shutdown,
            children: Mutex::new(Vec::new()),
            close_hooks: Mutex::new(Vec::new()),
            context_watcher: Mutex::new(None),
            closed: AtomicBool::new(false),
        });

        if let Some(context) = context {
            let weak = Arc::downgrade(&inner);
            let watcher = tokio::spawn(async move {
                context.done().await;
                if let Some(inner) = weak.upgrade() {
                    tracing::debug!("context cancelled, raising node shutdown signal");
                    inner.shutdown.send_replace(true);
                }
            });
            *inner.context_watcher.lock() = Some(watcher);
        }

        tracing::info!(node_id = %inner.id, routing = %inner.routing, "node built");
        Ok(Node { inner })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("only online nodes can be built by the daemon")]
    Offline,

    #[error("node identity is unusable: {0}")]
    Identity(#[source] ConfigError),
}

/// A failed build, carrying back the repository handle that was never
/// transferred to a node.
#[derive(Debug)]
pub struct BuildFailure {
    error: BuildError,
    repo: RepositoryHandle,
}

impl BuildFailure {
    fn new(error: BuildError, repo: RepositoryHandle) -> Self {
        Self { error, repo }
    }

    pub fn error(&self) -> &BuildError {
        &self.error
    }

    pub fn into_parts(self) -> (BuildError, RepositoryHandle) {
        (self.error, self.repo)
    }
}

impl fmt::Display for BuildFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node construction failed: {}", self.error)
    }
}

impl std::error::Error for BuildFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
