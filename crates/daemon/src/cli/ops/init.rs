use clap::Args;

use common::addr::{self, AddrError};
use common::config::{
    ConfigError, Identity, RepoConfig, DEFAULT_API_ADDR, DEFAULT_GATEWAY_ADDR,
};
use common::repo::{self, RepoError};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Multiaddr for the API server
    #[arg(long, default_value = DEFAULT_API_ADDR)]
    pub api_addr: String,

    /// Multiaddr for the gateway server
    #[arg(long, default_value = DEFAULT_GATEWAY_ADDR, conflicts_with = "no_gateway")]
    pub gateway_addr: String,

    /// Do not configure a gateway
    #[arg(long)]
    pub no_gateway: bool,

    /// Make the gateway writable by default
    #[arg(long)]
    pub writable: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("invalid address: {0}")]
    Address(#[from] AddrError),

    #[error("failed to generate identity: {0}")]
    Identity(#[from] ConfigError),

    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl Init {
    fn config(&self) -> Result<RepoConfig, InitError> {
        addr::parse_multiaddr(&self.api_addr)?;
        let gateway = if self.no_gateway {
            None
        } else {
            addr::parse_multiaddr(&self.gateway_addr)?;
            Some(self.gateway_addr.clone())
        };

        let mut config = RepoConfig::with_identity(Identity::generate()?);
        config.addresses.api = self.api_addr.clone();
        config.addresses.gateway = gateway;
        config.gateway.writable = self.writable;
        Ok(config)
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let config = repo::init(&ctx.repo_path, Some(self.config()?))?;

        let mut output = format!(
            "Initialized repository at {}\npeer identity: {}\napi: {}",
            ctx.repo_path.display(),
            config.identity.peer_id,
            config.addresses.api
        );
        match &config.addresses.gateway {
            Some(gateway) => output.push_str(&format!("\ngateway: {}", gateway)),
            None => output.push_str("\ngateway: disabled"),
        }
        Ok(output)
    }
}
