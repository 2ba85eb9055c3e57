//! `/ipfs` and `/ipns` content handlers, plus Host-header routing.

use std::net::IpAddr;

use axum::extract::Request;
use axum::http::{header, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::{Extension, Router};

use common::node::Node;

use super::access::AccessPolicy;
use super::webui;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayOptions {
    /// Accept POST, PUT and DELETE.
    pub writable: bool,
    /// Restrict reachable paths. `None` serves every path.
    pub access: Option<AccessPolicy>,
}

pub fn router(options: GatewayOptions) -> Router<Node> {
    Router::new()
        .route("/ipfs/*path", any(handler))
        .route("/ipns/*path", any(handler))
        .layer(Extension(options))
}

async fn handler(
    Extension(options): Extension<GatewayOptions>,
    method: Method,
    uri: Uri,
) -> Response {
    let path = uri.path();
    if let Some(access) = options.access {
        if !access.allows(path) {
            tracing::debug!(path, "gateway path rejected by access policy");
            return (StatusCode::FORBIDDEN, "403 - Forbidden").into_response();
        }
    }

    match method {
        Method::GET | Method::HEAD => read(path),
        Method::POST | Method::PUT | Method::DELETE if options.writable => (
            StatusCode::NOT_IMPLEMENTED,
            "content writes are not supported by this node",
        )
            .into_response(),
        Method::POST | Method::PUT | Method::DELETE => (
            StatusCode::METHOD_NOT_ALLOWED,
            "gateway is read-only; start the daemon with --writable",
        )
            .into_response(),
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

fn read(path: &str) -> Response {
    match webui::asset(path) {
        Some(response) => response,
        None => (StatusCode::NOT_FOUND, "content not found on this node").into_response(),
    }
}

/// Rewrite requests addressed to a DNS name onto the `/ipns` namespace,
/// so `Host: example.com` with path `/a` is served from `/ipns/example.com/a`.
pub fn rewrite_hostname(mut request: Request) -> Request {
    if let Some(target) = hostname_target(&request) {
        match target.parse::<Uri>() {
            Ok(uri) => {
                tracing::debug!(from = %request.uri(), to = %uri, "hostname routing");
                *request.uri_mut() = uri;
            }
            Err(e) => tracing::debug!("hostname rewrite produced an invalid uri: {}", e),
        }
    }
    request
}

fn hostname_target(request: &Request) -> Option<String> {
    let path = request.uri().path();
    if is_namespaced(path) {
        return None;
    }

    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())?;
    let name = dns_name(host)?;

    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    Some(format!("/ipns/{}{}", name, path_and_query))
}

fn is_namespaced(path: &str) -> bool {
    ["/ipfs", "/ipns"]
        .iter()
        .any(|ns| path == *ns || path.starts_with(&format!("{}/", ns)))
}

/// The DNS name in a Host header, if it is one. IP literals and bare
/// single-label names such as `localhost` do not count.
fn dns_name(host: &str) -> Option<&str> {
    if host.starts_with('[') {
        return None;
    }
    let name = match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    };

    if name.is_empty() || !name.contains('.') || name.parse::<IpAddr>().is_ok() {
        return None;
    }
    Some(name)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;

    use super::*;

    fn request(host: Option<&str>, uri: &str) -> Request {
        let mut builder = axum::http::Request::builder().uri(uri);
        if let Some(host) = host {
            builder = builder.header(header::HOST, host);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_dns_name() {
        assert_eq!(dns_name("example.com"), Some("example.com"));
        assert_eq!(dns_name("docs.example.com:8080"), Some("docs.example.com"));
        assert_eq!(dns_name("localhost"), None);
        assert_eq!(dns_name("localhost:8080"), None);
        assert_eq!(dns_name("127.0.0.1"), None);
        assert_eq!(dns_name("127.0.0.1:8080"), None);
        assert_eq!(dns_name("[::1]:8080"), None);
        assert_eq!(dns_name(""), None);
    }

    #[test]
    fn test_rewrite_dns_host() {
        let rewritten = rewrite_hostname(request(Some("example.com"), "/docs/a.html?x=1"));
        assert_eq!(rewritten.uri(), "/ipns/example.com/docs/a.html?x=1");
    }

    #[test]
    fn test_rewrite_root() {
        let rewritten = rewrite_hostname(request(Some("example.com:8080"), "/"));
        assert_eq!(rewritten.uri(), "/ipns/example.com/");
    }

    #[test]
    fn test_no_rewrite_for_namespaced_paths() {
        let rewritten = rewrite_hostname(request(Some("example.com"), "/ipfs/QmFoo"));
        assert_eq!(rewritten.uri(), "/ipfs/QmFoo");

        let rewritten = rewrite_hostname(request(Some("example.com"), "/ipns/other.org/a"));
        assert_eq!(rewritten.uri(), "/ipns/other.org/a");
    }

    #[test]
    fn test_no_rewrite_without_dns_host() {
        let rewritten = rewrite_hostname(request(Some("127.0.0.1:8080"), "/docs"));
        assert_eq!(rewritten.uri(), "/docs");

        let rewritten = rewrite_hostname(request(None, "/docs"));
        assert_eq!(rewritten.uri(), "/docs");
    }

    #[test]
    fn test_namespace_prefix_must_be_a_segment() {
        assert!(is_namespaced("/ipfs"));
        assert!(is_namespaced("/ipns/a"));
        assert!(!is_namespaced("/ipfsfoo"));
    }
}
