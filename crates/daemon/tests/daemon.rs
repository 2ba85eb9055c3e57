//! End-to-end daemon runs against temporary repositories

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use cairn_daemon::process::{self, launch_services, DaemonOptions};
use cairn_daemon::{supervise, DaemonError, MountError, UnavailableDriver};
use common::config::{Identity, RepoConfig};
use common::context::Context;
use common::node::{Node, NodeBuilder};
use common::repo::{self, RepoError, RepositoryHandle, CONFIG_FILE_NAME};
use common::routing::RoutingError;

const EPHEMERAL: &str = "/ip4/127.0.0.1/tcp/0";
const OTHER_CONTENT: &str = "/ipfs/QmcgpsyWgH8Y8ajJz1Cu72KnS5uo2Aa2LpzU7kinSupNKC";

fn setup_repo(gateway: bool, edit: impl FnOnce(&mut RepoConfig)) -> TempDir {
    let temp = TempDir::new().unwrap();
    let mut config = RepoConfig::with_identity(Identity::generate().unwrap());
    config.addresses.api = EPHEMERAL.to_string();
    config.addresses.gateway = gateway.then(|| EPHEMERAL.to_string());
    edit(&mut config);
    repo::init(temp.path(), Some(config)).unwrap();
    temp
}

fn options(path: &Path) -> DaemonOptions {
    DaemonOptions {
        repo_path: path.to_path_buf(),
        ..Default::default()
    }
}

async fn build_node(path: &Path) -> Node {
    let handle = RepositoryHandle::acquire(path).unwrap();
    NodeBuilder::new(handle).online().build().await.unwrap()
}

fn assert_unlocked(path: &Path) {
    RepositoryHandle::acquire(path)
        .expect("repository lock should be released")
        .release()
        .unwrap();
}

async fn run_with(options: &DaemonOptions, ctx: Context) -> Result<(), DaemonError> {
    tokio::time::timeout(
        Duration::from_secs(10),
        process::run(options, ctx, Arc::new(UnavailableDriver)),
    )
    .await
    .expect("daemon run should finish")
}

#[tokio::test]
async fn test_run_until_cancelled() {
    let temp = setup_repo(true, |_| {});
    let (ctx, canceller) = Context::with_cancel();

    let options = options(temp.path());
    let run = tokio::spawn(async move { run_with(&options, ctx).await });

    tokio::time::sleep(Duration::from_millis(200)).await;
    canceller.cancel();

    run.await.unwrap().unwrap();
    assert_unlocked(temp.path());
}

#[tokio::test]
async fn test_run_on_locked_repo() {
    let temp = setup_repo(true, |_| {});
    let held = RepositoryHandle::acquire(temp.path()).unwrap();

    let err = run_with(&options(temp.path()), Context::background())
        .await
        .unwrap_err();
    assert!(matches!(err, DaemonError::Repo(RepoError::LockHeld { .. })));

    held.release().unwrap();
}

#[tokio::test]
async fn test_run_on_uninitialized_repo() {
    let temp = TempDir::new().unwrap();
    let err = run_with(&options(&temp.path().join("missing")), Context::background())
        .await
        .unwrap_err();
    assert!(matches!(err, DaemonError::Repo(RepoError::Uninitialized(_))));
}

#[tokio::test]
async fn test_malformed_supernode_releases_lock() {
    let temp = setup_repo(true, |config| {
        config.supernode_routing.servers = vec![
            "/ip4/127.0.0.1/tcp/4001/p2p/QmNnooDu7bfjPFoTZYxMNLWUQJyrVwtbZg5gBMjTezGAJN"
                .to_string(),
            "not a multiaddr".to_string(),
        ];
    });
    let mut options = options(temp.path());
    options.routing = "supernode".to_string();

    let err = run_with(&options, Context::background()).await.unwrap_err();
    assert!(matches!(
        err,
        DaemonError::Routing(RoutingError::InvalidPeerAddress { .. })
    ));
    assert_unlocked(temp.path());
}

#[tokio::test]
async fn test_mount_failure_aborts_startup() {
    let temp = setup_repo(true, |_| {});
    let mounts = TempDir::new().unwrap();
    let mut options = options(temp.path());
    options.mount = true;
    options.ipfs_mount = Some(mounts.path().to_path_buf());
    options.ipns_mount = Some(mounts.path().to_path_buf());

    let err = run_with(&options, Context::background()).await.unwrap_err();
    assert!(matches!(err, DaemonError::Mount(MountError::Unsupported)));
    assert_unlocked(temp.path());
}

#[tokio::test]
async fn test_bind_failure_releases_lock() {
    let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = occupied.local_addr().unwrap().port();
    let temp = setup_repo(false, |config| {
        config.addresses.api = format!("/ip4/127.0.0.1/tcp/{}", port);
    });

    let err = run_with(&options(temp.path()), Context::background())
        .await
        .unwrap_err();
    assert!(matches!(err, DaemonError::Launch(_)));
    assert_unlocked(temp.path());
}

#[tokio::test]
async fn test_gateway_absent() {
    let temp = setup_repo(false, |_| {});
    let node = build_node(temp.path()).await;

    let services = launch_services(&node, &options(temp.path())).await.unwrap();
    assert!(services.gateway.is_none());
    assert_ne!(services.api.local_addr().port(), 0);
    assert!(services
        .api
        .bound_addr()
        .to_string()
        .starts_with("/ip4/127.0.0.1/tcp/"));

    let merged = services.merge();
    assert_eq!(merged.sources(), 1);

    node.close().await.unwrap();
    tokio::time::timeout(Duration::from_secs(1), supervise(merged))
        .await
        .unwrap()
        .unwrap();
    assert_unlocked(temp.path());
}

#[tokio::test]
async fn test_blank_gateway_address_disables_gateway() {
    let temp = setup_repo(true, |config| config.addresses.gateway = Some(String::new()));
    let node = build_node(temp.path()).await;

    let services = launch_services(&node, &options(temp.path())).await.unwrap();
    assert!(services.gateway.is_none());

    let merged = services.merge();
    assert_eq!(merged.sources(), 1);

    node.close().await.unwrap();
}

#[tokio::test]
async fn test_init_on_fresh_path_then_rerun() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("repo");
    let mut options = options(&path);
    options.init = true;

    // a fresh default repo has no supernodes, so this stops right after
    // init and before any listener binds
    options.routing = "supernode".to_string();
    let err = run_with(&options, Context::background()).await.unwrap_err();
    assert!(matches!(err, DaemonError::Routing(RoutingError::NoSupernodes)));
    assert!(repo::is_initialized(&path));
    assert_unlocked(&path);

    let config_path = path.join(CONFIG_FILE_NAME);
    let mut config = RepoConfig::load(&config_path).unwrap();
    config.addresses.api = EPHEMERAL.to_string();
    config.addresses.gateway = Some(EPHEMERAL.to_string());
    config.save(&config_path).unwrap();
    let before = std::fs::read_to_string(&config_path).unwrap();

    options.routing = String::new();
    let (ctx, canceller) = Context::with_cancel();
    let run = tokio::spawn(async move { run_with(&options, ctx).await });
    tokio::time::sleep(Duration::from_millis(200)).await;
    canceller.cancel();
    run.await.unwrap().unwrap();

    assert_eq!(std::fs::read_to_string(&config_path).unwrap(), before);
    assert_unlocked(&path);
}

#[tokio::test]
async fn test_api_access_policy_over_http() {
    for (unrestricted, expected) in [
        (false, reqwest::StatusCode::FORBIDDEN),
        (true, reqwest::StatusCode::NOT_FOUND),
    ] {
        let temp = setup_repo(true, |_| {});
        let node = build_node(temp.path()).await;
        let mut options = options(temp.path());
        options.unrestricted_api = unrestricted;

        let services = launch_services(&node, &options).await.unwrap();
        let api = services.api.local_addr();

        let response = reqwest::get(format!("http://{}{}", api, OTHER_CONTENT))
            .await
            .unwrap();
        assert_eq!(response.status(), expected);

        // the web UI stays reachable either way
        let response = reqwest::get(format!("http://{}/webui", api)).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);

        node.close().await.unwrap();
    }
}

#[tokio::test]
async fn test_gateway_writability() {
    for (flag, configured, expected) in [
        (None, false, reqwest::StatusCode::METHOD_NOT_ALLOWED),
        (None, true, reqwest::StatusCode::NOT_IMPLEMENTED),
        (Some(true), false, reqwest::StatusCode::NOT_IMPLEMENTED),
        (Some(false), true, reqwest::StatusCode::METHOD_NOT_ALLOWED),
    ] {
        let temp = setup_repo(true, |config| config.gateway.writable = configured);
        let node = build_node(temp.path()).await;
        let mut options = options(temp.path());
        options.writable = flag;

        let services = launch_services(&node, &options).await.unwrap();
        let gateway = services.gateway.as_ref().unwrap().local_addr();

        let response = reqwest::Client::new()
            .post(format!("http://{}{}", gateway, OTHER_CONTENT))
            .send()
            .await
            .unwrap();
        assert_eq!(
            response.status(),
            expected,
            "flag {:?}, configured {}",
            flag,
            configured
        );

        node.close().await.unwrap();
    }
}

#[tokio::test]
async fn test_gateway_does_not_serve_commands() {
    let temp = setup_repo(true, |_| {});
    let node = build_node(temp.path()).await;

    let services = launch_services(&node, &options(temp.path())).await.unwrap();
    let api = services.api.local_addr();
    let gateway = services.gateway.as_ref().unwrap().local_addr();

    let response = reqwest::get(format!("http://{}/api/v0/id", api)).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["id"], node.id().to_string());

    let response = reqwest::get(format!("http://{}/api/v0/id", gateway))
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

    node.close().await.unwrap();
}
