use axum::response::Redirect;
use axum::routing::get;
use axum::Router;
use tower::ServiceBuilder;

use common::node::Node;

use super::gateway::{self, GatewayOptions};
use super::{api, debug, handlers, health, webui};
use super::{API_PREFIX, DEBUG_PREFIX, VERSION_PATH};

/// One handler group to install on an HTTP service.
///
/// Options are applied in order. Each path is owned by at most one
/// option, so passing the same option twice is a programming error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServeOption {
    /// The `/api/v0` command bridge.
    Commands,
    /// `/webui` redirect to the bundled web UI.
    WebUi,
    /// `/ipfs` and `/ipns` content handlers.
    Gateway(GatewayOptions),
    /// `/version` build information.
    Version,
    /// `/debug/vars` runtime variables.
    Debug,
    /// Serve requests for DNS hostnames from `/ipns/<host>`.
    HostnameRouting,
    /// Redirect `/` to the given target.
    RootRedirect(String),
}

impl ServeOption {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Commands => "commands",
            Self::WebUi => "webui",
            Self::Gateway(_) => "gateway",
            Self::Version => "version",
            Self::Debug => "debug",
            Self::HostnameRouting => "hostname-routing",
            Self::RootRedirect(_) => "root-redirect",
        }
    }
}

/// Build the request pipeline for a service from its options.
pub fn compose(node: &Node, options: &[ServeOption]) -> Router {
    let mut router: Router<Node> = Router::new();
    let mut hostname_routing = false;

    for option in options {
        router = match option {
            ServeOption::Commands => router.nest(API_PREFIX, api::router()),
            ServeOption::WebUi => router.merge(webui::router()),
            ServeOption::Gateway(gateway_options) => {
                router.merge(gateway::router(*gateway_options))
            }
            ServeOption::Version => router.route(VERSION_PATH, get(health::version::handler)),
            ServeOption::Debug => router.nest(DEBUG_PREFIX, debug::router()),
            ServeOption::HostnameRouting => {
                hostname_routing = true;
                router
            }
            ServeOption::RootRedirect(target) => {
                let target = target.clone();
                router.route(
                    "/",
                    get(move || {
                        let target = target.clone();
                        async move { Redirect::temporary(&target) }
                    }),
                )
            }
        };
    }

    let router = router
        .fallback(handlers::not_found_handler)
        .with_state(node.clone());

    if hostname_routing {
        // runs before routing so rewritten paths reach the gateway routes
        let rewriting = ServiceBuilder::new()
            .map_request(gateway::rewrite_hostname)
            .service(router);
        Router::new().fallback_service(rewriting)
    } else {
        router
    }
}
