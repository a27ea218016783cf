//! The offline asset cache handler: install seeds the cache, fetch serves from it.

use std::time::{Duration, Instant};

use url::Url;

use crate::cache::{CacheStorage, CacheStore, add_all};
use crate::error::Result;
use crate::manifest::AssetManifest;
use crate::network::Network;
use crate::request::{Request, Response};

/// Lifecycle events the worker reacts to.
#[derive(Debug, Clone)]
pub enum Event {
    /// Seed the cache store with every manifest asset.
    Install,
    /// Answer an intercepted request.
    Fetch(Request),
}

/// What handling an [`Event`] produced.
#[derive(Debug, Clone)]
pub enum EventOutcome {
    Installed(InstallReport),
    Responded(Fetched),
}

/// Summary of a successful install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Cache store that was seeded.
    pub cache_name: String,
    /// Number of assets stored.
    pub assets: usize,
    /// Total body bytes stored.
    pub bytes: u64,
    /// Time taken by the whole install.
    pub elapsed: Duration,
}

/// Where a fetch response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Cache,
    Network,
}

/// Response to an intercepted request plus its origin.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub response: Response,
    pub source: Source,
}

/// Offline asset cache handler.
///
/// Holds no state of its own between events; everything persistent lives in
/// the injected [`CacheStorage`].
pub struct OfflineWorker<S, N> {
    storage: S,
    network: N,
    manifest: AssetManifest,
    scope: Url,
    concurrent_fetches: usize,
}

impl<S, N> OfflineWorker<S, N> {
    #[must_use]
    pub const fn storage(&self) -> &S {
        &self.storage
    }

    #[must_use]
    pub const fn network(&self) -> &N {
        &self.network
    }

    #[must_use]
    pub const fn scope(&self) -> &Url {
        &self.scope
    }
}

impl<S: CacheStorage, N: Network> OfflineWorker<S, N> {
    /// Creates a worker that resolves manifest paths against `scope`.
    #[must_use]
    pub const fn new(storage: S, network: N, manifest: AssetManifest, scope: Url) -> Self {
        Self {
            storage,
            network,
            manifest,
            scope,
            concurrent_fetches: 4,
        }
    }

    /// Sets how many assets install fetches at once.
    #[must_use]
    pub const fn with_concurrent_fetches(mut self, concurrent: usize) -> Self {
        self.concurrent_fetches = concurrent;
        self
    }

    /// Dispatches an event to its handler.
    ///
    /// # Errors
    ///
    /// Propagates the error of the handler unchanged.
    pub async fn handle(&self, event: Event) -> Result<EventOutcome> {
        match event {
            Event::Install => self.install().await.map(EventOutcome::Installed),
            Event::Fetch(request) => self.fetch(request).await.map(EventOutcome::Responded),
        }
    }

    /// Opens the manifest's cache store and adds every asset to it.
    ///
    /// Either every asset is stored or none is.
    ///
    /// # Errors
    ///
    /// Returns the first asset resolution, transport, or status error. The
    /// cache store is left as it was before the call.
    pub async fn install(&self) -> Result<InstallReport> {
        let started = Instant::now();
        let cache_name = self.manifest.cache_name();
        log::info!(
            "Installing {} assets into {cache_name}",
            self.manifest.assets().len()
        );

        let result = async {
            let requests = self.manifest.requests(&self.scope)?;
            let store = self.storage.open(cache_name).await?;
            let count = requests.len();
            let bytes = add_all(&store, &self.network, requests, self.concurrent_fetches).await?;
            Ok::<_, crate::Error>((store, count, bytes))
        }
        .await;

        match result {
            Ok((store, assets, bytes)) => {
                let report = InstallReport {
                    cache_name: store.name().to_string(),
                    assets,
                    bytes,
                    elapsed: started.elapsed(),
                };
                log::info!(
                    "Installed {} assets ({} bytes) into {} in {:?}",
                    report.assets,
                    report.bytes,
                    report.cache_name,
                    report.elapsed
                );
                Ok(report)
            }
            Err(e) => {
                log::error!("Install of {cache_name} failed: {e}");
                Err(e)
            }
        }
    }

    /// Answers `request` from the cache, or from the network on a miss.
    ///
    /// Network responses are returned unchanged and never stored.
    ///
    /// # Errors
    ///
    /// Returns storage errors, and network errors on a miss.
    pub async fn fetch(&self, request: Request) -> Result<Fetched> {
        if let Some(response) = self.storage.match_request(&request).await? {
            log::debug!("Cache hit: {} {}", request.method, request.url);
            return Ok(Fetched {
                response,
                source: Source::Cache,
            });
        }

        log::debug!("Cache miss, fetching: {} {}", request.method, request.url);
        let response = self.network.fetch(&request).await?;
        Ok(Fetched {
            response,
            source: Source::Network,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::cache::MemoryCacheStorage;

    struct MockNetwork {
        bodies: Mutex<HashMap<String, &'static str>>,
        calls: AtomicUsize,
    }

    impl MockNetwork {
        fn serving(paths: &[(&str, &'static str)]) -> Self {
            let scope = scope();
            Self {
                bodies: Mutex::new(
                    paths
                        .iter()
                        .map(|(p, body)| (scope.join(p).unwrap().to_string(), *body))
                        .collect(),
                ),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Network for MockNetwork {
        async fn fetch(&self, request: &Request) -> Result<Response> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let body = self
                .bodies
                .lock()
                .unwrap()
                .get(request.url.as_str())
                .copied()
                .ok_or_else(|| {
                    crate::Error::Io(std::io::Error::new(
                        std::io::ErrorKind::ConnectionRefused,
                        "offline",
                    ))
                })?;
            Ok(Response::ok(request.url.clone(), body))
        }
    }

    fn scope() -> Url {
        Url::parse("https://example.com/app/").unwrap()
    }

    fn manifest() -> AssetManifest {
        AssetManifest::new("test-v1", vec!["./".into(), "./index.html".into()])
    }

    #[tokio::test]
    async fn handle_install_dispatches_to_install() {
        let network = MockNetwork::serving(&[("./", "root"), ("./index.html", "index")]);
        let worker = OfflineWorker::new(MemoryCacheStorage::new(), network, manifest(), scope());

        let outcome = worker.handle(Event::Install).await.unwrap();
        let EventOutcome::Installed(report) = outcome else {
            panic!("expected install outcome");
        };
        assert_eq!(report.cache_name, "test-v1");
        assert_eq!(report.assets, 2);
        assert_eq!(report.bytes, 9);
    }

    #[tokio::test]
    async fn handle_fetch_dispatches_to_fetch() {
        let network = MockNetwork::serving(&[("./other.css", "body{}")]);
        let worker = OfflineWorker::new(MemoryCacheStorage::new(), network, manifest(), scope());

        let request = Request::resolve(&scope(), "other.css").unwrap();
        let outcome = worker.handle(Event::Fetch(request)).await.unwrap();
        let EventOutcome::Responded(fetched) = outcome else {
            panic!("expected fetch outcome");
        };
        assert_eq!(fetched.source, Source::Network);
        assert_eq!(fetched.response.body.as_ref(), b"body{}");
    }

    #[tokio::test]
    async fn fetch_after_install_is_served_from_cache() {
        let network = MockNetwork::serving(&[("./", "root"), ("./index.html", "index")]);
        let worker = OfflineWorker::new(MemoryCacheStorage::new(), network, manifest(), scope());
        worker.install().await.unwrap();
        let calls_after_install = worker.network.calls.load(Ordering::SeqCst);

        let fetched = worker
            .fetch(Request::resolve(&scope(), "index.html").unwrap())
            .await
            .unwrap();

        assert_eq!(fetched.source, Source::Cache);
        assert_eq!(fetched.response.body.as_ref(), b"index");
        assert_eq!(worker.network.calls.load(Ordering::SeqCst), calls_after_install);
    }

    #[tokio::test]
    async fn failed_install_leaves_store_empty() {
        let network = MockNetwork::serving(&[("./", "root")]);
        let worker = OfflineWorker::new(MemoryCacheStorage::new(), network, manifest(), scope())
            .with_concurrent_fetches(1);

        assert!(worker.install().await.is_err());

        let store = worker.storage().open("test-v1").await.unwrap();
        assert!(store.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_asset_path_fails_install() {
        let network = MockNetwork::serving(&[]);
        let manifest = AssetManifest::new("bad", vec!["http://[::1".into()]);
        let worker = OfflineWorker::new(MemoryCacheStorage::new(), network, manifest, scope());

        let err = worker.install().await.unwrap_err();
        assert!(matches!(err, crate::Error::InvalidUrl { .. }));
        assert_eq!(worker.network.calls.load(Ordering::SeqCst), 0);
    }
}
