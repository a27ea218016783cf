//! Cache storage seam and the aggregate add-all operation.
//!
//! A [`CacheStorage`] owns any number of named [`CacheStore`]s. The worker
//! only ever opens one store by name, seeds it through [`add_all`], and looks
//! requests up across every store. Two backends are provided:
//! [`MemoryCacheStorage`] and [`DiskCacheStorage`].

mod disk;
mod memory;

pub use disk::{DiskCacheStorage, DiskCacheStore};
pub use memory::{MemoryCacheStorage, MemoryCacheStore};

use std::collections::HashSet;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, stream};

use crate::error::{Error, Result};
use crate::network::Network;
use crate::request::{Request, Response};

/// A named collection of request → response pairs.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Name the store was opened with.
    fn name(&self) -> &str;

    /// Returns the stored response whose request matches `request`.
    async fn match_request(&self, request: &Request) -> Result<Option<Response>>;

    /// Stores every pair in one step. An existing entry with the same key is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedMethod`] if any request is not `GET`;
    /// in that case nothing is written.
    async fn put_all(&self, entries: Vec<(Request, Response)>) -> Result<()>;

    /// Returns the stored requests in insertion order.
    async fn keys(&self) -> Result<Vec<Request>>;
}

/// A set of named cache stores.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    type Store: CacheStore;

    /// Opens the store called `name`, creating it if absent.
    async fn open(&self, name: &str) -> Result<Self::Store>;

    /// Returns store names in creation order.
    async fn names(&self) -> Result<Vec<String>>;

    /// Looks `request` up across all stores, oldest store first.
    async fn match_request(&self, request: &Request) -> Result<Option<Response>> {
        for name in self.names().await? {
            let store = self.open(&name).await?;
            if let Some(response) = store.match_request(request).await? {
                return Ok(Some(response));
            }
        }
        Ok(None)
    }
}

/// Rejects non-`GET` requests before a store writes anything.
pub(crate) fn ensure_cacheable(entries: &[(Request, Response)]) -> Result<()> {
    entries
        .iter()
        .find(|(request, _)| request.method != reqwest::Method::GET)
        .map_or(Ok(()), |(request, _)| {
            Err(Error::UnsupportedMethod(request.method.clone()))
        })
}

/// Fetches every request and stores the responses in `store`, all or nothing.
///
/// Up to `concurrency` fetches run at once. Every response is staged in
/// memory first; the store is written only after all fetches have succeeded
/// with a 2xx status, in a single [`CacheStore::put_all`] call. The first
/// failure aborts the batch and leaves the store untouched.
///
/// Returns the number of bytes stored.
///
/// # Errors
///
/// - [`Error::DuplicateRequest`] if two requests share a cache key
///   (checked before any fetch).
/// - [`Error::BadStatus`] if any response is not 2xx.
/// - Any transport error from `network`.
pub async fn add_all<S, N>(
    store: &S,
    network: &N,
    requests: Vec<Request>,
    concurrency: usize,
) -> Result<u64>
where
    S: CacheStore + ?Sized,
    N: Network + ?Sized,
{
    let mut seen = HashSet::new();
    for request in &requests {
        if !seen.insert(request.cache_key()) {
            return Err(Error::DuplicateRequest(request.url.to_string()));
        }
    }

    let staged: Vec<(Request, Response)> = stream::iter(requests)
        .map(|request| async move {
            let response = network.fetch(&request).await?;
            if !response.is_success() {
                return Err(Error::BadStatus {
                    url: request.url.to_string(),
                    status: response.status,
                });
            }
            log::debug!(
                "Staged {} ({} bytes) for {}",
                request.url,
                response.body.len(),
                store.name()
            );
            Ok::<_, Error>((request, response))
        })
        .buffered(concurrency.max(1))
        .try_collect()
        .await?;

    let bytes = staged.iter().map(|(_, r)| r.body.len() as u64).sum();
    store.put_all(staged).await?;
    Ok(bytes)
}
