use axum::http::header;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use rust_embed::RustEmbed;

use common::node::Node;

use super::access::WEBUI_PATHS;
use super::WEBUI_REDIRECT_PATH;

#[derive(RustEmbed)]
#[folder = "static/webui"]
struct WebUiAssets;

pub fn router() -> Router<Node> {
    Router::new().route(WEBUI_REDIRECT_PATH, get(redirect))
}

async fn redirect() -> Redirect {
    Redirect::temporary(WEBUI_PATHS[0])
}

/// Serve a bundled web UI file if `path` points inside one of the web UI
/// content paths.
pub fn asset(path: &str) -> Option<Response> {
    let rest = WEBUI_PATHS
        .iter()
        .find_map(|prefix| path.strip_prefix(prefix))?;
    if !rest.is_empty() && !rest.starts_with('/') {
        return None;
    }

    let file = match rest.trim_start_matches('/') {
        "" => "index.html",
        file => file,
    };
    let content = WebUiAssets::get(file)?;
    let mime = mime_guess::from_path(file).first_or_octet_stream();

    Some(
        (
            [(header::CONTENT_TYPE, mime.as_ref().to_string())],
            content.data.into_owned(),
        )
            .into_response(),
    )
}
