//! Asset manager behaviour against a local release feed.

use std::fs::File;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use chrono::Utc;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use toke_core::{DownloadProgress, Platform};
use toke_runtime::assets::{AssetConfig, AssetError, AssetManager, Dependency, Manifest};

const LINUX: Platform = Platform::new("linux", "amd64");

#[derive(Clone)]
struct ReleaseServer {
    llama_archive: Arc<Vec<u8>>,
    feed_hits: Arc<AtomicUsize>,
    asset_hits: Arc<AtomicUsize>,
}

async fn feed(State(server): State<ReleaseServer>, headers: HeaderMap) -> Json<serde_json::Value> {
    server.feed_hits.fetch_add(1, Ordering::SeqCst);
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default()
        .to_string();
    Json(json!({
        "tag_name": "v1.0.0",
        "assets": [
            {
                "name": "llama-server-linux-amd64.tar.gz",
                "size": server.llama_archive.len(),
                "browser_download_url": format!("http://{host}/assets/llama-server-linux-amd64.tar.gz")
            },
            {
                "name": "ngrok-linux-amd64.zip",
                "size": 10,
                "browser_download_url": format!("http://{host}/assets/missing.zip")
            }
        ]
    }))
}

async fn llama_asset(State(server): State<ReleaseServer>) -> Response {
    server.asset_hits.fetch_add(1, Ordering::SeqCst);
    (StatusCode::OK, server.llama_archive.as_ref().clone()).into_response()
}

async fn spawn_server(server: ReleaseServer) -> SocketAddr {
    let app = Router::new()
        .route("/releases/latest", get(feed))
        .route("/assets/llama-server-linux-amd64.tar.gz", get(llama_asset))
        .route("/assets/missing.zip", get(|| async { StatusCode::NOT_FOUND }))
        .with_state(server);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn tar_gz(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::fast()));
    for (name, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

fn release_server() -> ReleaseServer {
    ReleaseServer {
        llama_archive: Arc::new(tar_gz(&[(
            "llama-server-linux-amd64",
            b"#!/bin/sh\necho llama\n",
        )])),
        feed_hits: Arc::default(),
        asset_hits: Arc::default(),
    }
}

fn isolated_config(root: &Path) -> AssetConfig {
    AssetConfig::new(root.join("data").join("backends"))
        .with_embedded_manifest(None)
        .with_search_root(root.join("checkout"))
        .with_home_dir(None)
        .with_system_paths(false)
        .with_platform(LINUX)
}

fn drain(rx: &mut mpsc::Receiver<DownloadProgress>) -> Vec<DownloadProgress> {
    let mut out = Vec::new();
    while let Ok(p) = rx.try_recv() {
        out.push(p);
    }
    out
}

fn statuses(updates: &[DownloadProgress], name: &str) -> Vec<String> {
    updates
        .iter()
        .filter(|p| p.name == name)
        .map(|p| p.status.clone())
        .collect()
}

fn write_manifest(path: &Path, deps: Vec<Dependency>) {
    let manifest = Manifest {
        version: "v1.0.0".to_string(),
        dependencies: deps,
        updated_at: Utc::now(),
    };
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, serde_json::to_vec(&manifest).unwrap()).unwrap();
}

fn llama_dep(url: String) -> Dependency {
    Dependency {
        name: "llama".to_string(),
        version: "v1.0.0".to_string(),
        url,
        size: 100,
        executable: "llama-server".to_string(),
        local_path: None,
        required: true,
        platform: "linux-amd64".to_string(),
    }
}

#[tokio::test]
async fn local_build_skips_every_download() {
    let server = release_server();
    let addr = spawn_server(server.clone()).await;
    let temp = tempfile::tempdir().unwrap();

    let local = temp
        .path()
        .join("checkout/apps/backend/llama/llama-server-linux-amd64");
    std::fs::create_dir_all(local.parent().unwrap()).unwrap();
    std::fs::write(&local, b"local build").unwrap();

    let embedded = temp.path().join("bin").join("backends-manifest.json");
    write_manifest(
        &embedded,
        vec![llama_dep(format!(
            "http://{addr}/assets/llama-server-linux-amd64.tar.gz"
        ))],
    );

    let config = isolated_config(temp.path()).with_embedded_manifest(Some(embedded));
    let (manager, mut rx) = AssetManager::new(config).unwrap();
    manager
        .check_and_install(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(server.asset_hits.load(Ordering::SeqCst), 0);
    assert_eq!(server.feed_hits.load(Ordering::SeqCst), 0);
    assert_eq!(
        statuses(&drain(&mut rx), "llama"),
        vec![format!("Using local build: {}", local.display())]
    );

    let path = manager
        .get_executable_path("llama", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(path, local);
}

#[tokio::test]
async fn installs_from_release_feed_and_skips_optional_failures() {
    let server = release_server();
    let addr = spawn_server(server.clone()).await;
    let temp = tempfile::tempdir().unwrap();
    let config = isolated_config(temp.path())
        .with_feed_url(format!("http://{addr}/releases/latest"));
    let base = config.base_dir.clone();

    let (manager, mut rx) = AssetManager::new(config).unwrap();
    let cancel = CancellationToken::new();
    manager.check_and_install(&cancel).await.unwrap();

    let exe = base.join("llama").join("llama-server");
    assert_eq!(std::fs::read(&exe).unwrap(), b"#!/bin/sh\necho llama\n");
    assert_eq!(
        std::fs::read_to_string(base.join("llama").join("VERSION")).unwrap(),
        "v1.0.0"
    );
    assert!(!base.join("llama").join("download-llama-server-linux-amd64.tar.gz").exists());
    assert!(base.join("manifest.json").exists());

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&exe).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    let updates = drain(&mut rx);
    let llama = statuses(&updates, "llama");
    assert_eq!(llama.first().map(String::as_str), Some("Starting download"));
    assert!(llama.contains(&"Extracting".to_string()));
    assert_eq!(llama.last().map(String::as_str), Some("Installed"));

    let ngrok: Vec<_> = updates.iter().filter(|p| p.name == "ngrok").collect();
    let last = ngrok.last().unwrap();
    assert_eq!(last.status, "Skipped (optional)");
    assert!(last.error.is_some());

    // Second pass uses the cached manifest and the installed binary
    manager.check_and_install(&cancel).await.unwrap();
    assert_eq!(server.feed_hits.load(Ordering::SeqCst), 1);
    assert_eq!(server.asset_hits.load(Ordering::SeqCst), 1);
    assert!(statuses(&drain(&mut rx), "llama").contains(&"Already installed".to_string()));

    let versions = manager.installed_versions(&cancel).await.unwrap();
    assert_eq!(versions.get("llama").map(String::as_str), Some("v1.0.0"));
    assert_eq!(versions.get("ngrok").map(String::as_str), Some("not installed"));
}

#[tokio::test]
async fn required_failure_aborts() {
    let addr = spawn_server(release_server()).await;
    let temp = tempfile::tempdir().unwrap();
    let embedded = temp.path().join("backends-manifest.json");
    write_manifest(&embedded, vec![llama_dep(format!("http://{addr}/assets/missing.zip"))]);

    let config = isolated_config(temp.path()).with_embedded_manifest(Some(embedded));
    let (manager, _rx) = AssetManager::new(config).unwrap();
    let err = manager
        .check_and_install(&CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        AssetError::RequiredInstallFailed { name, source } => {
            assert_eq!(name, "llama");
            assert!(matches!(*source, AssetError::Download(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn update_check_compares_version_files() {
    let temp = tempfile::tempdir().unwrap();
    let embedded = temp.path().join("backends-manifest.json");
    let mut ngrok = llama_dep("http://unused/ngrok.zip".to_string());
    ngrok.name = "ngrok".to_string();
    ngrok.executable = "ngrok".to_string();
    ngrok.required = false;
    let mut mlx = llama_dep("http://unused/mlx.tar.gz".to_string());
    mlx.name = "mlx".to_string();
    mlx.executable = "mlx-server".to_string();
    write_manifest(
        &embedded,
        vec![llama_dep("http://unused/llama.tar.gz".to_string()), ngrok, mlx],
    );

    let config = isolated_config(temp.path()).with_embedded_manifest(Some(embedded));
    let base: PathBuf = config.base_dir.clone();
    for (name, exe, version) in [
        ("llama", "llama-server", Some("v0.9.0")),
        ("ngrok", "ngrok", None),
    ] {
        std::fs::create_dir_all(base.join(name)).unwrap();
        std::fs::write(base.join(name).join(exe), b"bin").unwrap();
        if let Some(v) = version {
            std::fs::write(base.join(name).join("VERSION"), v).unwrap();
        }
    }

    let (manager, mut rx) = AssetManager::new(config).unwrap();
    let updates = manager
        .check_for_updates(&CancellationToken::new())
        .await
        .unwrap();
    let names: Vec<_> = updates.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, ["llama", "ngrok"]);

    let reported = drain(&mut rx);
    assert_eq!(
        statuses(&reported, "llama"),
        ["Update available: v0.9.0 -> v1.0.0"]
    );
    assert_eq!(
        statuses(&reported, "ngrok"),
        ["No version file, update available"]
    );
    assert!(statuses(&reported, "mlx").is_empty());

    std::fs::write(base.join("llama").join("VERSION"), "v1.0.0\n").unwrap();
    let updates = manager
        .check_for_updates(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(updates.len(), 1);
    assert!(statuses(&drain(&mut rx), "llama").contains(&"Up to date: v1.0.0".to_string()));
}

#[tokio::test]
async fn stale_cache_is_refreshed() {
    let server = release_server();
    let addr = spawn_server(server.clone()).await;
    let temp = tempfile::tempdir().unwrap();
    let config = isolated_config(temp.path())
        .with_feed_url(format!("http://{addr}/releases/latest"))
        .with_manifest_max_age(Duration::from_secs(60));

    let stale = Manifest {
        version: "v0.1.0".to_string(),
        dependencies: Vec::new(),
        updated_at: Utc::now() - chrono::Duration::hours(2),
    };
    std::fs::create_dir_all(&config.base_dir).unwrap();
    serde_json::to_writer(
        File::create(config.base_dir.join("manifest.json")).unwrap(),
        &stale,
    )
    .unwrap();

    let (manager, _rx) = AssetManager::new(config).unwrap();
    let manifest = manager
        .get_manifest(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(manifest.version, "v1.0.0");
    assert_eq!(server.feed_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_executable_is_reported() {
    let temp = tempfile::tempdir().unwrap();
    let (manager, _rx) = AssetManager::new(isolated_config(temp.path())).unwrap();
    let err = manager
        .get_executable_path("llama", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AssetError::NotInstalled(name) if name == "llama"));
}
