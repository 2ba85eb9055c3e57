//! Daemon bootstrap and supervision.
//!
//! [`run`] drives one daemon lifetime: lock the repository, pick a routing
//! backend, build the node, launch the HTTP services, optionally mount the
//! filesystem, and then block until a service fails or all of them stop.
//! The node is closed on every path out once it exists, and the repository
//! lock is released on every path out once it is held.

pub mod utils;

use std::path::PathBuf;
use std::sync::Arc;

use common::config::RepoConfig;
use common::context::Context;
use common::node::{BuildError, CloseError, Node, NodeBuilder};
use common::repo::{self, RepoError, RepositoryHandle};
use common::routing::{RoutingBackend, RoutingError};

use crate::http_server::{
    self, AccessPolicy, GatewayOptions, LaunchError, ServeOption, ServiceHandle,
};
use crate::mount::{self, FilesystemDriver, MountError, MountPaths};
use crate::supervisor::{self, MergedErrorSignal, ServiceError};

pub const API_SERVICE: &str = "api";
pub const GATEWAY_SERVICE: &str = "gateway";

/// Everything the `daemon` command line can change about a run.
#[derive(Debug, Clone, Default)]
pub struct DaemonOptions {
    pub repo_path: PathBuf,
    /// Initialize the repository first if it does not exist yet.
    pub init: bool,
    /// Routing option; empty means the default backend.
    pub routing: String,
    pub mount: bool,
    /// Overrides `gateway.writable` from the config when set.
    pub writable: Option<bool>,
    pub ipfs_mount: Option<PathBuf>,
    pub ipns_mount: Option<PathBuf>,
    pub unrestricted_api: bool,
}

/// Where a daemon run currently is. Only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    Init,
    Locking,
    RoutingResolved,
    NodeBuilt,
    ServicesLaunching,
    Supervising,
    ShuttingDownClean,
    ShuttingDownOnError,
    Closed,
}

fn enter(state: DaemonState) {
    tracing::debug!(?state, "daemon state");
}

/// The services started for one run.
#[derive(Debug)]
pub struct Services {
    pub api: ServiceHandle,
    pub gateway: Option<ServiceHandle>,
}

impl Services {
    pub fn merge(self) -> MergedErrorSignal {
        supervisor::merge([
            Some(self.api.into_signal()),
            self.gateway.map(ServiceHandle::into_signal),
        ])
    }
}

/// Run the daemon until `ctx` is cancelled or a service fails.
pub async fn run(
    options: &DaemonOptions,
    ctx: Context,
    driver: Arc<dyn FilesystemDriver>,
) -> Result<(), DaemonError> {
    println!("Initializing daemon...");
    enter(DaemonState::Init);

    let interrupt_logger = {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            ctx.done().await;
            println!("Received interrupt signal, shutting down...");
        })
    };

    let result = bootstrap(options, &ctx, driver).await;
    interrupt_logger.abort();
    result
}

async fn bootstrap(
    options: &DaemonOptions,
    ctx: &Context,
    driver: Arc<dyn FilesystemDriver>,
) -> Result<(), DaemonError> {
    if options.init && repo::init_if_absent(&options.repo_path)? {
        println!("Initialized repository at {}", options.repo_path.display());
    }

    enter(DaemonState::Locking);
    let repo = RepositoryHandle::acquire(&options.repo_path)?;

    let routing = match RoutingBackend::select(&options.routing, repo.config()) {
        Ok(routing) => routing,
        Err(e) => {
            release(repo);
            return Err(e.into());
        }
    };
    enter(DaemonState::RoutingResolved);

    let built = NodeBuilder::new(repo)
        .online()
        .routing(routing)
        .context(ctx.clone())
        .build()
        .await;
    let node = match built {
        Ok(node) => node,
        Err(failure) => {
            tracing::error!("error from node construction: {}", failure.error());
            let (error, repo) = failure.into_parts();
            release(repo);
            return Err(error.into());
        }
    };
    enter(DaemonState::NodeBuilt);

    let outcome = serve(&node, options, driver).await;

    enter(if outcome.is_ok() {
        DaemonState::ShuttingDownClean
    } else {
        DaemonState::ShuttingDownOnError
    });
    let closed = node.close().await;

    match &outcome {
        _ if ctx.is_done() => tracing::info!("Gracefully shut down daemon"),
        Ok(()) => tracing::info!("all services stopped, daemon exiting"),
        Err(e) => tracing::error!("daemon stopping on error: {}", e),
    }
    enter(DaemonState::Closed);

    outcome?;
    closed?;
    Ok(())
}

fn release(repo: RepositoryHandle) {
    if let Err(e) = repo.release() {
        tracing::error!("failed to release repository lock: {}", e);
    }
}

async fn serve(
    node: &Node,
    options: &DaemonOptions,
    driver: Arc<dyn FilesystemDriver>,
) -> Result<(), DaemonError> {
    enter(DaemonState::ServicesLaunching);
    let services = launch_services(node, options).await?;

    if options.mount {
        let paths = MountPaths::resolve(
            options.ipfs_mount.clone(),
            options.ipns_mount.clone(),
            &node.config().mounts,
        );
        mount::mount(node, driver, &paths)?;
        println!("IPFS mounted at: {}", paths.ipfs.display());
        println!("IPNS mounted at: {}", paths.ipns.display());
    }

    enter(DaemonState::Supervising);
    supervisor::supervise(services.merge()).await?;
    Ok(())
}

/// Start the API service and, when an address is configured, the gateway.
///
/// If the gateway fails to start the API service is left running; it
/// belongs to the node and stops when the node closes.
pub async fn launch_services(node: &Node, options: &DaemonOptions) -> Result<Services, LaunchError> {
    let config = node.config();

    let api = http_server::launch(
        node,
        API_SERVICE,
        &config.addresses.api,
        api_options(config, options.unrestricted_api),
    )
    .await?;
    println!("API server listening on {}", api.bound_addr());

    let gateway = match gateway_address(config) {
        Some(address) => {
            let writable = options.writable.unwrap_or(config.gateway.writable);
            let gateway = http_server::launch(
                node,
                GATEWAY_SERVICE,
                address,
                gateway_options(config, writable),
            )
            .await?;
            println!(
                "Gateway ({}) server listening on {}",
                if writable { "writable" } else { "readonly" },
                gateway.bound_addr()
            );
            Some(gateway)
        }
        None => {
            tracing::info!("no gateway address configured, gateway disabled");
            None
        }
    };

    Ok(Services { api, gateway })
}

/// Handlers installed on the API service.
pub fn api_options(config: &RepoConfig, unrestricted: bool) -> Vec<ServeOption> {
    let mut options = vec![
        ServeOption::Commands,
        ServeOption::WebUi,
        ServeOption::Gateway(GatewayOptions {
            writable: true,
            access: Some(AccessPolicy::new(unrestricted)),
        }),
        ServeOption::Version,
        ServeOption::Debug,
    ];
    if let Some(target) = root_redirect(config) {
        options.push(ServeOption::RootRedirect(target));
    }
    options
}

/// Handlers installed on the gateway service.
pub fn gateway_options(config: &RepoConfig, writable: bool) -> Vec<ServeOption> {
    let mut options = vec![
        ServeOption::Version,
        ServeOption::HostnameRouting,
        ServeOption::Gateway(GatewayOptions {
            writable,
            access: None,
        }),
    ];
    if let Some(target) = root_redirect(config) {
        options.push(ServeOption::RootRedirect(target));
    }
    options
}

/// The configured gateway address; missing or blank disables the gateway.
fn gateway_address(config: &RepoConfig) -> Option<&str> {
    config
        .addresses
        .gateway
        .as_deref()
        .map(str::trim)
        .filter(|address| !address.is_empty())
}

fn root_redirect(config: &RepoConfig) -> Option<String> {
    config
        .gateway
        .root_redirect
        .as_ref()
        .filter(|target| !target.is_empty())
        .cloned()
}

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error("error from node construction: {0}")]
    Build(#[from] BuildError),

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error(transparent)]
    Mount(#[from] MountError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Close(#[from] CloseError),
}
