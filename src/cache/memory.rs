//! Process-local cache storage.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use super::{CacheStorage, CacheStore, ensure_cacheable};
use crate::error::Result;
use crate::request::{Request, Response};

type Entries = Arc<Mutex<Vec<(Request, Response)>>>;

/// In-memory [`CacheStorage`]. Clones share the same stores.
#[derive(Debug, Clone, Default)]
pub struct MemoryCacheStorage {
    stores: Arc<Mutex<Vec<(String, Entries)>>>,
}

impl MemoryCacheStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    type Store = MemoryCacheStore;

    async fn open(&self, name: &str) -> Result<MemoryCacheStore> {
        let mut stores = self.stores.lock().unwrap_or_else(PoisonError::into_inner);
        let entries = if let Some((_, entries)) = stores.iter().find(|(n, _)| n == name) {
            Arc::clone(entries)
        } else {
            let entries = Entries::default();
            stores.push((name.to_string(), Arc::clone(&entries)));
            entries
        };
        Ok(MemoryCacheStore {
            name: name.to_string(),
            entries,
        })
    }

    async fn names(&self) -> Result<Vec<String>> {
        let stores = self.stores.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(stores.iter().map(|(name, _)| name.clone()).collect())
    }
}

/// Handle to one in-memory store.
#[derive(Debug, Clone)]
pub struct MemoryCacheStore {
    name: String,
    entries: Entries,
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn match_request(&self, request: &Request) -> Result<Option<Response>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries
            .iter()
            .find(|(stored, _)| stored.matches(request))
            .map(|(_, response)| response.clone()))
    }

    async fn put_all(&self, batch: Vec<(Request, Response)>) -> Result<()> {
        ensure_cacheable(&batch)?;
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        for (request, response) in batch {
            if let Some(slot) = entries.iter_mut().find(|(stored, _)| stored.matches(&request)) {
                *slot = (request, response);
            } else {
                entries.push((request, response));
            }
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<Request>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.iter().map(|(request, _)| request.clone()).collect())
    }
}
