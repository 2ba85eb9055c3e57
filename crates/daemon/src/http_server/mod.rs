//! HTTP service launcher.
//!
//! [`launch`] turns a configured multiaddr and a list of [`ServeOption`]s
//! into a running HTTP server registered as a child of the node. The
//! listener is bound before `launch` returns so the caller can report the
//! actual address; serving happens on a node child task that stops when
//! the node raises its shutdown signal.

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::{DefaultOnFailure, DefaultOnResponse, TraceLayer};
use tower_http::LatencyUnit;

use common::addr::{self, AddrError, Multiaddr};
use common::node::{Node, NodeError};

pub mod access;
mod api;
mod debug;
pub mod gateway;
mod handlers;
mod health;
pub mod options;
mod webui;

pub use access::{AccessPolicy, WEBUI_PATHS};
pub use gateway::GatewayOptions;
pub use options::{compose, ServeOption};

use crate::supervisor::{self, ErrorSignal, ServiceError};

pub const API_PREFIX: &str = "/api";
pub const DEBUG_PREFIX: &str = "/debug";
pub const VERSION_PATH: &str = "/version";
pub const WEBUI_REDIRECT_PATH: &str = "/webui";

/// A service that is bound and serving.
#[derive(Debug)]
pub struct ServiceHandle {
    name: &'static str,
    bound_addr: Multiaddr,
    local_addr: SocketAddr,
    errors: ErrorSignal,
}

impl ServiceHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The address actually bound, with any ephemeral port resolved.
    pub fn bound_addr(&self) -> &Multiaddr {
        &self.bound_addr
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Give up the handle for its error signal, which yields at most one
    /// serving error and closes once the server stops.
    pub fn into_signal(self) -> ErrorSignal {
        self.errors
    }
}

/// Bind `address` and start serving the handlers composed from `options`.
pub async fn launch(
    node: &Node,
    name: &'static str,
    address: &str,
    options: Vec<ServeOption>,
) -> Result<ServiceHandle, LaunchError> {
    let configured = addr::parse_multiaddr(address)
        .map_err(|source| LaunchError::Address { service: name, source })?;
    let socket_addr = addr::to_socket_addr(&configured)
        .map_err(|source| LaunchError::Address { service: name, source })?;

    let listener = TcpListener::bind(socket_addr)
        .await
        .map_err(|source| LaunchError::Bind {
            service: name,
            addr: configured.clone(),
            source,
        })?;
    let local_addr = listener.local_addr().map_err(|source| LaunchError::Bind {
        service: name,
        addr: configured.clone(),
        source,
    })?;
    let bound_addr = addr::from_socket_addr(local_addr);

    let router = options::compose(node, &options).layer(trace_layer());
    let (reporter, errors) = supervisor::error_signal();
    let shutdown = node.shutdown_signal();

    node.spawn_child(name, async move {
        let served = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await;
        match served {
            Ok(()) => tracing::info!(service = name, "server stopped"),
            Err(source) => {
                tracing::error!(service = name, "server failed: {}", source);
                let _ = reporter.send(ServiceError::new(name, source)).await;
            }
        }
    })?;

    tracing::info!(
        service = name,
        addr = %bound_addr,
        options = ?options.iter().map(ServeOption::name).collect::<Vec<_>>(),
        "server listening"
    );

    Ok(ServiceHandle {
        name,
        bound_addr,
        local_addr,
        errors,
    })
}

fn trace_layer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>> {
    TraceLayer::new_for_http()
        .on_response(
            DefaultOnResponse::new()
                .include_headers(false)
                .level(tracing::Level::DEBUG)
                .latency_unit(LatencyUnit::Micros),
        )
        .on_failure(DefaultOnFailure::new().latency_unit(LatencyUnit::Micros))
}

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("{service}: invalid listen address: {source}")]
    Address {
        service: &'static str,
        #[source]
        source: AddrError,
    },

    #[error("{service}: failed to bind {addr}: {source}")]
    Bind {
        service: &'static str,
        addr: Multiaddr,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Node(#[from] NodeError),
}
