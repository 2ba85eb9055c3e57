use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use common::node::Node;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingResponse {
    pub mode: String,
    /// Fixed peers in the order they were configured. Empty for the
    /// default backend.
    pub peers: Vec<RoutingPeer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingPeer {
    pub id: String,
    pub addrs: Vec<String>,
}

pub async fn handler(State(node): State<Node>) -> Response {
    let routing = node.routing();
    let peers = routing
        .peers()
        .iter()
        .map(|peer| RoutingPeer {
            id: peer.id().to_string(),
            addrs: peer.addrs().iter().map(ToString::to_string).collect(),
        })
        .collect();

    Json(RoutingResponse {
        mode: routing.mode().to_string(),
        peers,
    })
    .into_response()
}
