//! asset-cache - offline-first caching of a web application's static assets.
//!
//! An [`OfflineWorker`] reacts to two events: install pre-caches a fixed list
//! of assets into a named cache store, all or nothing; fetch answers a request
//! from the cache and falls back to the network on a miss, without caching
//! the network response.
//!
//! # Example
//!
//! ```no_run
//! use asset_cache::{AssetManifest, HttpNetwork, MemoryCacheStorage, OfflineWorker, Request};
//!
//! # async fn example() -> asset_cache::Result<()> {
//! let scope = url::Url::parse("https://example.com/app/").unwrap();
//! let worker = OfflineWorker::new(
//!     MemoryCacheStorage::new(),
//!     HttpNetwork::new(reqwest::Client::new()),
//!     AssetManifest::default(),
//!     scope.clone(),
//! );
//!
//! // Seed the cache
//! let report = worker.install().await?;
//! println!("Cached {} assets", report.assets);
//!
//! // Served from the cache, no network round-trip
//! let fetched = worker.fetch(Request::resolve(&scope, "index.html")?).await?;
//! println!("{:?}: {} bytes", fetched.source, fetched.response.body.len());
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod cache;
pub mod config;
pub mod error;
pub mod manifest;
pub mod network;
pub mod request;
#[cfg(feature = "server")]
pub mod server;
pub mod worker;

// Re-export main types for convenience
pub use cache::{
    CacheStorage, CacheStore, DiskCacheStorage, DiskCacheStore, MemoryCacheStorage,
    MemoryCacheStore, add_all,
};
pub use config::{AppConfig, CacheConfig, NetworkConfig, ServerConfig};
pub use error::{Error, Result};
pub use manifest::{ASSETS, AssetManifest, CACHE_NAME};
pub use network::{HttpNetwork, Network};
pub use request::{Request, Response};
pub use worker::{Event, EventOutcome, Fetched, InstallReport, OfflineWorker, Source};
