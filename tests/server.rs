//! End-to-end tests for the offline-first server against a local upstream.

#![cfg(feature = "server")]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use asset_cache::server::{HEALTH_PATH, router};
use asset_cache::{AssetManifest, HttpNetwork, MemoryCacheStorage, OfflineWorker};
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use url::Url;

/// Starts `app` on an ephemeral localhost port and returns its base URL.
async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/")
}

/// Upstream serving the default manifest assets and counting every hit.
async fn spawn_upstream(hits: Arc<AtomicUsize>) -> String {
    async fn asset(State(hits): State<Arc<AtomicUsize>>) -> &'static str {
        hits.fetch_add(1, Ordering::SeqCst);
        "asset"
    }

    async fn live(State(hits): State<Arc<AtomicUsize>>) -> (StatusCode, &'static str) {
        hits.fetch_add(1, Ordering::SeqCst);
        (StatusCode::OK, "live")
    }

    let app = Router::new()
        .route("/", get(asset))
        .route("/index.html", get(asset))
        .route("/biobots.js", get(asset))
        .route("/biobots_bg.wasm", get(asset))
        .route("/live.json", get(live))
        .route("/echo", post(|body: String| async move { format!("got:{body}") }))
        .with_state(hits);
    spawn(app).await
}

async fn spawn_cache(scope: &str) -> (String, Arc<OfflineWorker<MemoryCacheStorage, HttpNetwork>>) {
    let worker = Arc::new(OfflineWorker::new(
        MemoryCacheStorage::new(),
        HttpNetwork::new(reqwest::Client::new()),
        AssetManifest::default(),
        Url::parse(scope).unwrap(),
    ));
    let base = spawn(router(Arc::clone(&worker))).await;
    (base, worker)
}

#[tokio::test]
async fn health_endpoint_bypasses_worker() {
    let (base, _) = spawn_cache("http://127.0.0.1:9/").await;
    let resp = reqwest::get(format!("{base}{}", HEALTH_PATH.trim_start_matches('/')))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.text().await.unwrap().contains("ok"));
}

#[tokio::test]
async fn installed_assets_are_served_without_upstream() {
    let hits = Arc::new(AtomicUsize::new(0));
    let upstream = spawn_upstream(Arc::clone(&hits)).await;
    let (base, worker) = spawn_cache(&upstream).await;

    worker.install().await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 4);

    for path in ["", "index.html", "biobots.js", "biobots_bg.wasm"] {
        let resp = reqwest::get(format!("{base}{path}")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK, "{path}");
        assert_eq!(resp.text().await.unwrap(), "asset");
    }
    assert_eq!(hits.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn misses_are_proxied_and_not_cached() {
    let hits = Arc::new(AtomicUsize::new(0));
    let upstream = spawn_upstream(Arc::clone(&hits)).await;
    let (base, _) = spawn_cache(&upstream).await;

    for expected_hits in 1..=2 {
        let resp = reqwest::get(format!("{base}live.json")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.text().await.unwrap(), "live");
        assert_eq!(hits.load(Ordering::SeqCst), expected_hits);
    }
}

#[tokio::test]
async fn request_body_is_forwarded_to_upstream() {
    let hits = Arc::new(AtomicUsize::new(0));
    let upstream = spawn_upstream(hits).await;
    let (base, _) = spawn_cache(&upstream).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}echo"))
        .body("hello")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "got:hello");
}

#[tokio::test]
async fn upstream_status_passes_through() {
    let hits = Arc::new(AtomicUsize::new(0));
    let upstream = spawn_upstream(hits).await;
    let (base, _) = spawn_cache(&upstream).await;

    let resp = reqwest::get(format!("{base}missing.png")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unreachable_upstream_is_bad_gateway() {
    let (base, _) = spawn_cache("http://127.0.0.1:9/").await;

    let resp = reqwest::get(format!("{base}index.html")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
}
