use axum::Router;

use common::node::Node;

pub mod v0;

pub fn router() -> Router<Node> {
    Router::new()
        .nest("/v0", v0::router())
        .fallback(v0::unknown_command)
}
