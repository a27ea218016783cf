//! Offline-first HTTP server: every incoming request becomes a fetch event.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use bytes::Bytes;
use axum::body::Body;
use axum::extract::{Request as HttpRequest, State};
use axum::http::header::{CONNECTION, CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response as HttpResponse};
use axum::routing::get;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::cache::CacheStorage;
use crate::network::Network;
use crate::request::Request;
use crate::worker::OfflineWorker;

/// Path of the health endpoint. Never routed through the worker.
pub const HEALTH_PATH: &str = "/__asset-cache/health";

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

async fn health() -> impl IntoResponse {
    axum::Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Hop-by-hop headers that must not be copied between connections.
///
/// `content-length` is recomputed by the outgoing client from the body.
fn strip_hop_headers(headers: &mut HeaderMap) {
    for name in [HOST, CONNECTION, TRANSFER_ENCODING, CONTENT_LENGTH] {
        headers.remove(name);
    }
}

/// Builds the worker request for an incoming HTTP request.
///
/// The path and query are resolved against the worker's scope, so
/// `/index.html` on the local server maps to `<scope>/index.html`.
fn to_worker_request<S, N>(
    worker: &OfflineWorker<S, N>,
    parts: &Parts,
    body: Bytes,
) -> crate::Result<Request>
where
    S: CacheStorage,
    N: Network,
{
    let path_and_query = parts.uri.path_and_query().map_or("/", |pq| pq.as_str());
    // Always relative to the scope, so a path can never name another origin.
    let relative = format!("./{}", path_and_query.trim_start_matches('/'));

    let mut headers = parts.headers.clone();
    strip_hop_headers(&mut headers);

    Ok(Request::resolve(worker.scope(), &relative)?
        .with_method(parts.method.clone())
        .with_headers(headers)
        .with_body(body))
}

async fn fetch_event<S, N>(
    State(worker): State<Arc<OfflineWorker<S, N>>>,
    request: HttpRequest,
) -> HttpResponse
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(body) => body,
        Err(e) => {
            log::warn!("Reading body of {} failed: {e}", parts.uri);
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    let result = match to_worker_request(&worker, &parts, body) {
        Ok(request) => worker.fetch(request).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(fetched) => {
            let response = fetched.response;
            let mut headers = response.headers;
            strip_hop_headers(&mut headers);

            let mut http = HttpResponse::new(Body::from(response.body));
            *http.status_mut() = response.status;
            *http.headers_mut() = headers;
            http
        }
        Err(e) => {
            log::warn!("Fetch of {} failed: {e}", parts.uri);
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
    }
}

/// Builds the router that sends every request except the health check through `worker`.
pub fn router<S, N>(worker: Arc<OfflineWorker<S, N>>) -> Router
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(HEALTH_PATH, get(health))
        .fallback(fetch_event::<S, N>)
        .layer(cors)
        .with_state(worker)
}

/// Serves `worker` on an already bound listener until the process ends.
///
/// # Errors
///
/// Returns an error if the server fails while accepting connections.
pub async fn serve<S, N>(
    listener: tokio::net::TcpListener,
    worker: Arc<OfflineWorker<S, N>>,
) -> std::io::Result<()>
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        log::info!("Serving {} offline-first on http://{addr}", worker.scope());
    }
    axum::serve(listener, router(worker)).await
}

/// Binds `host:port` and serves `worker`.
///
/// # Errors
///
/// Returns an error if the address is invalid or cannot be bound.
pub async fn run_server<S, N>(
    worker: Arc<OfflineWorker<S, N>>,
    host: &str,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve(listener, worker).await?;
    Ok(())
}
