use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};

use common::node::Node;

pub mod id;
pub mod routing;

use crate::http_server::health;

pub fn router() -> Router<Node> {
    Router::new()
        .route("/id", get(id::handler).post(id::handler))
        .route("/routing", get(routing::handler).post(routing::handler))
        .route("/version", get(health::version::handler).post(health::version::handler))
        .fallback(unknown_command)
}

pub(super) async fn unknown_command(uri: Uri) -> Response {
    let path = uri.path().trim_start_matches('/');
    let command = path.strip_prefix("v0/").unwrap_or(path);
    let msg = serde_json::json!({
        "message": format!("unknown command: {}", command),
        "code": 0,
        "type": "error",
    });
    (StatusCode::NOT_FOUND, Json(msg)).into_response()
}
