//! The running node.
//!
//! A [`Node`] is "this peer, joined to the network". It owns its routing
//! backend, its repository lease, and every child task spawned against
//! it. Services receive a cheap clone of the node and only ever read from
//! it; tearing the node down goes through [`Node::close`].
//!
//! # Close contract
//!
//! `close` flips the node's shutdown signal, which every child service
//! is expected to honour by closing its listener, and then waits for all
//! registered children to finish (bounded by the shutdown timeout). Only
//! after that are close hooks run and the repository lock released. The
//! daemon relies on this: cancelling the daemon's context never stops a
//! service directly, it only causes the node to raise its shutdown
//! signal.

mod builder;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::addr::PeerId;
use crate::config::RepoConfig;
use crate::repo::{RepoError, RepositoryHandle};
use crate::routing::RoutingBackend;

pub use builder::{BuildError, BuildFailure, NodeBuilder};

/// How long `close` waits for children before giving up on them.
pub const FINAL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

type CloseHook = Box<dyn FnOnce() + Send + 'static>;

struct Child {
    name: String,
    handle: JoinHandle<()>,
}

struct NodeInner {
    id: PeerId,
    repo_path: PathBuf,
    config: RepoConfig,
    routing: RoutingBackend,
    started_at: Instant,
    shutdown_timeout: Duration,

    repo: Mutex<Option<RepositoryHandle>>,
    shutdown: watch::Sender<bool>,
    children: Mutex<Vec<Child>>,
    close_hooks: Mutex<Vec<(String, CloseHook)>>,
    context_watcher: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.inner.id)
            .field("routing", &self.inner.routing)
            .field("repo_path", &self.inner.repo_path)
            .finish()
    }
}

impl Node {
    pub fn id(&self) -> PeerId {
        self.inner.id
    }

    pub fn routing(&self) -> &RoutingBackend {
        &self.inner.routing
    }

    /// The repository configuration as it was when the node was built.
    pub fn config(&self) -> &RepoConfig {
        &self.inner.config
    }

    pub fn repo_path(&self) -> &Path {
        &self.inner.repo_path
    }

    pub fn uptime(&self) -> Duration {
        self.inner.started_at.elapsed()
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    /// Resolves once the node starts shutting down.
    ///
    /// Hand this to a server's graceful shutdown hook so `close` can
    /// actually stop it.
    pub fn shutdown_signal(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.inner.shutdown.subscribe();
        async move {
            let _ = rx.wait_for(|stopping| *stopping).await;
        }
    }

    /// Run `task` as a child of this node. `close` waits for it.
    pub fn spawn_child<F>(&self, name: impl Into<String>, task: F) -> Result<(), NodeError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(NodeError::Closed(name));
        }

        let handle = tokio::spawn(task);
        tracing::debug!(child = %name, "spawned node child");
        self.inner.children.lock().push(Child { name, handle });
        Ok(())
    }

    /// Names of the children that are still running.
    pub fn children(&self) -> Vec<String> {
        self.inner
            .children
            .lock()
            .iter()
            .filter(|child| !child.handle.is_finished())
            .map(|child| child.name.clone())
            .collect()
    }

    /// Register something to undo once every child has stopped, such as a
    /// filesystem mount. Hooks run in reverse registration order.
    pub fn on_close<F>(&self, name: impl Into<String>, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner
            .close_hooks
            .lock()
            .push((name.into(), Box::new(hook)));
    }

    /// Stop every child, run close hooks and release the repository.
    ///
    /// Calling `close` more than once is a no-op after the first call.
    pub async fn close(&self) -> Result<(), CloseError> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        tracing::info!(node_id = %self.inner.id, "closing node");
        self.inner.shutdown.send_replace(true);
        if let Some(watcher) = self.inner.context_watcher.lock().take() {
            watcher.abort();
        }

        let children = std::mem::take(&mut *self.inner.children.lock());
        let (names, handles): (Vec<_>, Vec<_>) = children
            .into_iter()
            .map(|child| (child.name, child.handle))
            .unzip();

        let mut result = Ok(());
        match timeout(self.inner.shutdown_timeout, join_all(handles)).await {
            Ok(outcomes) => {
                for (name, outcome) in names.iter().zip(outcomes) {
                    match outcome {
                        Ok(()) => tracing::debug!(child = %name, "node child stopped"),
                        Err(e) => tracing::error!(child = %name, "node child failed: {}", e),
                    }
                }
            }
            Err(_) => {
                tracing::error!(
                    "node children did not stop within {} seconds",
                    self.inner.shutdown_timeout.as_secs()
                );
                result = Err(CloseError::Timeout(names));
            }
        }

        let hooks = std::mem::take(&mut *self.inner.close_hooks.lock());
        for (name, hook) in hooks.into_iter().rev() {
            tracing::debug!(hook = %name, "running close hook");
            hook();
        }

        let repo = self.inner.repo.lock().take();
        if let Some(repo) = repo {
            if let Err(e) = repo.release() {
                tracing::error!("failed to release repository: {}", e);
                result = result.and(Err(CloseError::Release(e)));
            }
        }

        tracing::info!(node_id = %self.inner.id, "node closed");
        result
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("node is closed; cannot start {0}")]
    Closed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CloseError {
    #[error("node children did not stop in time: {0:?}")]
    Timeout(Vec<String>),

    #[error("failed to release repository: {0}")]
    Release(#[from] RepoError),
}
