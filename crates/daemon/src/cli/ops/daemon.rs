use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;

use cairn_daemon::process::{self, utils, DaemonOptions};
use cairn_daemon::{DaemonError, UnavailableDriver};

const DAEMON_HELP: &str = "\
Run a network-connected node.

The daemon starts an API server and, if configured, a gateway server.
Their listen addresses are read from the repository config:

    [addresses]
    api = \"/ip4/127.0.0.1/tcp/5001\"
    gateway = \"/ip4/127.0.0.1/tcp/8080\"

Remove the gateway entry to run without a gateway.

SECURITY

The API server exposes every node command. Anyone who can reach its
address controls the node, so keep it bound to a loopback interface.

The API also serves content under /ipfs so the bundled web UI can load.
By default only the web UI paths are reachable there. Passing
--unrestricted-api lifts that path filter. The filter is not
authentication and never protects the command endpoints.

The gateway is read-only unless --writable is given or the config sets
gateway.writable = true. A writable gateway lets anyone who can reach it
add and remove content.";

#[derive(Args, Debug, Clone)]
#[command(long_about = DAEMON_HELP)]
pub struct Daemon {
    /// Initialize the repository with default settings if it does not exist
    #[arg(long)]
    pub init: bool,

    /// Overrides the routing option (dht, supernode)
    #[arg(long, default_value = "")]
    pub routing: String,

    /// Mounts /ipfs and /ipns to the filesystem
    #[arg(long)]
    pub mount: bool,

    /// Enable writing objects through the gateway (overrides gateway.writable)
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub writable: Option<bool>,

    /// Path to the mountpoint for /ipfs (if using --mount)
    #[arg(long = "mount-ipfs")]
    pub ipfs_mount: Option<PathBuf>,

    /// Path to the mountpoint for /ipns (if using --mount)
    #[arg(long = "mount-ipns")]
    pub ipns_mount: Option<PathBuf>,

    /// Allow API access to unlisted content paths
    #[arg(long)]
    pub unrestricted_api: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum DaemonOpError {
    #[error("failed to install signal handlers: {0}")]
    Signals(#[from] std::io::Error),

    #[error(transparent)]
    Daemon(#[from] DaemonError),
}

impl Daemon {
    fn options(&self, repo_path: PathBuf) -> DaemonOptions {
        DaemonOptions {
            repo_path,
            init: self.init,
            routing: self.routing.clone(),
            mount: self.mount,
            writable: self.writable,
            ipfs_mount: self.ipfs_mount.clone(),
            ipns_mount: self.ipns_mount.clone(),
            unrestricted_api: self.unrestricted_api,
        }
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Daemon {
    type Error = DaemonOpError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let _guards = utils::init_logging(&utils::log_config(&ctx.repo_path));
        let (signal_task, cancel_ctx) = utils::graceful_shutdown_blocker()?;

        let options = self.options(ctx.repo_path.clone());
        let result = process::run(&options, cancel_ctx, Arc::new(UnavailableDriver)).await;
        signal_task.abort();

        result?;
        Ok("daemon stopped".to_string())
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        daemon: Daemon,
    }

    #[test]
    fn test_writable_flag_forms() {
        let cli = Cli::parse_from(["cairn"]);
        assert_eq!(cli.daemon.writable, None);

        let cli = Cli::parse_from(["cairn", "--writable"]);
        assert_eq!(cli.daemon.writable, Some(true));

        let cli = Cli::parse_from(["cairn", "--writable=false"]);
        assert_eq!(cli.daemon.writable, Some(false));
    }

    #[test]
    fn test_options_from_flags() {
        let cli = Cli::parse_from([
            "cairn",
            "--init",
            "--routing",
            "supernode",
            "--mount",
            "--mount-ipfs",
            "/mnt/ipfs",
            "--unrestricted-api",
        ]);
        let options = cli.daemon.options(PathBuf::from("/tmp/repo"));

        assert!(options.init);
        assert_eq!(options.routing, "supernode");
        assert!(options.mount);
        assert_eq!(options.ipfs_mount, Some(PathBuf::from("/mnt/ipfs")));
        assert_eq!(options.ipns_mount, None);
        assert!(options.unrestricted_api);
    }
}
