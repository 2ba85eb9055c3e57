use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use common::node::Node;
use common::version::{build_info, BuildInfo};

pub fn router() -> Router<Node> {
    Router::new().route("/vars", get(vars))
}

#[derive(Debug, Serialize)]
pub struct DebugVars {
    pid: u32,
    uptime_secs: u64,
    node_id: String,
    repo_path: String,
    routing: &'static str,
    fixed_peers: usize,
    services: Vec<String>,
    shutting_down: bool,
    build: BuildInfo,
}

async fn vars(State(node): State<Node>) -> Json<DebugVars> {
    Json(DebugVars {
        pid: std::process::id(),
        uptime_secs: node.uptime().as_secs(),
        node_id: node.id().to_string(),
        repo_path: node.repo_path().display().to_string(),
        routing: node.routing().mode(),
        fixed_peers: node.routing().peers().len(),
        services: node.children(),
        shutting_down: node.is_shutting_down(),
        build: build_info(),
    })
}
