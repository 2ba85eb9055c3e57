use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use common::node::Node;
use common::version::build_info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdResponse {
    pub id: String,
    pub agent_version: String,
    pub routing: String,
}

pub async fn handler(State(node): State<Node>) -> Response {
    Json(IdResponse {
        id: node.id().to_string(),
        agent_version: format!("cairn/{}", build_info().version),
        routing: node.routing().mode().to_string(),
    })
    .into_response()
}
