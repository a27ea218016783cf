//! On-disk cache storage.
//!
//! Layout under the root directory:
//!
//! ```text
//! index.toml              store names in creation order
//! <sha256(name)>/
//!     <sha256(key)>.json  request, status, headers, timestamps
//!     <sha256(key)>.body  response body
//! ```
//!
//! Every file is written to a `.tmp` sibling and renamed into place. A batch
//! is staged completely before the first rename, but the renames themselves
//! are not atomic as a group: a crash in the middle of them can leave part of
//! a batch visible.
//!
//! Writers are serialised by a lock shared between clones of one
//! [`DiskCacheStorage`]. It does not cover other instances or other processes
//! on the same root: two writers opening new stores at once can lose one of
//! the `index.toml` updates. Run one writer per directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use url::Url;

use super::{CacheStorage, CacheStore, ensure_cacheable};
use crate::error::{Error, Result};
use crate::request::{Request, Response};

const INDEX_FILE: &str = "index.toml";

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreIndex {
    stores: Vec<String>,
}

/// Metadata written next to each body file.
#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    method: String,
    url: String,
    request_headers: Vec<(String, String)>,
    status: u16,
    headers: Vec<(String, String)>,
    response_url: String,
    cached_at: DateTime<Utc>,
    /// Insertion position, kept when an entry is replaced.
    seq: u64,
}

/// [`CacheStorage`] persisted under a directory.
#[derive(Debug, Clone)]
pub struct DiskCacheStorage {
    root: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl DiskCacheStorage {
    /// Uses `root` as the storage directory. Nothing is created until a store is opened.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn load_index(&self) -> Result<StoreIndex> {
        match tokio::fs::read_to_string(self.root.join(INDEX_FILE)).await {
            Ok(contents) => toml::from_str(&contents)
                .map_err(|e| Error::Corrupt(format!("{INDEX_FILE}: {e}"))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(StoreIndex::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save_index(&self, index: &StoreIndex) -> Result<()> {
        let toml_str = toml::to_string(index)
            .map_err(|e| Error::Corrupt(format!("{INDEX_FILE}: {e}")))?;
        write_atomic(&self.root.join(INDEX_FILE), toml_str.as_bytes()).await
    }
}

#[async_trait]
impl CacheStorage for DiskCacheStorage {
    type Store = DiskCacheStore;

    async fn open(&self, name: &str) -> Result<DiskCacheStore> {
        let _guard = self.write_lock.lock().await;
        let dir = self.root.join(hex_digest(name.as_bytes()));
        tokio::fs::create_dir_all(&dir).await?;

        let mut index = self.load_index().await?;
        if !index.stores.iter().any(|n| n == name) {
            index.stores.push(name.to_string());
            self.save_index(&index).await?;
            log::debug!("Created cache store {name} at {}", dir.display());
        }

        Ok(DiskCacheStore {
            name: name.to_string(),
            dir,
            write_lock: Arc::clone(&self.write_lock),
        })
    }

    async fn names(&self) -> Result<Vec<String>> {
        Ok(self.load_index().await?.stores)
    }
}

/// Handle to one on-disk store.
#[derive(Debug, Clone)]
pub struct DiskCacheStore {
    name: String,
    dir: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl DiskCacheStore {
    fn meta_path(&self, hash: &str) -> PathBuf {
        self.dir.join(format!("{hash}.json"))
    }

    fn body_path(&self, hash: &str) -> PathBuf {
        self.dir.join(format!("{hash}.body"))
    }

    async fn read_meta(&self, hash: &str) -> Result<Option<EntryMeta>> {
        read_meta_file(&self.meta_path(hash)).await
    }

    async fn next_seq(&self) -> Result<u64> {
        Ok(self
            .read_all_meta()
            .await?
            .iter()
            .map(|m| m.seq + 1)
            .max()
            .unwrap_or(0))
    }

    /// Writes every entry to `.tmp` files, recording each `(tmp, final)` pair
    /// in `renames` before the write so a failure can clean up.
    async fn stage(
        &self,
        entries: Vec<(String, Request, Response)>,
        renames: &mut Vec<(PathBuf, PathBuf)>,
    ) -> Result<()> {
        let cached_at = Utc::now();
        let mut next_seq = self.next_seq().await?;

        for (hash, request, response) in entries {
            let seq = if let Some(existing) = self.read_meta(&hash).await? {
                existing.seq
            } else {
                next_seq += 1;
                next_seq - 1
            };

            let meta = EntryMeta {
                method: request.method.to_string(),
                url: request.url.to_string(),
                request_headers: headers_to_pairs(&request.headers),
                status: response.status.as_u16(),
                headers: headers_to_pairs(&response.headers),
                response_url: response.url.to_string(),
                cached_at,
                seq,
            };
            let json = serde_json::to_vec_pretty(&meta)
                .map_err(|e| Error::Corrupt(format!("{}: {e}", meta.url)))?;

            let body_path = self.body_path(&hash);
            let body_tmp = tmp_path(&body_path);
            renames.push((body_tmp.clone(), body_path));
            tokio::fs::write(&body_tmp, &response.body).await?;

            let meta_path = self.meta_path(&hash);
            let meta_tmp = tmp_path(&meta_path);
            renames.push((meta_tmp.clone(), meta_path));
            tokio::fs::write(&meta_tmp, json).await?;
        }
        Ok(())
    }

    async fn read_all_meta(&self) -> Result<Vec<EntryMeta>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut metas = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json")
                && let Some(meta) = read_meta_file(&path).await?
            {
                metas.push(meta);
            }
        }
        metas.sort_by_key(|m| m.seq);
        Ok(metas)
    }
}

#[async_trait]
impl CacheStore for DiskCacheStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn match_request(&self, request: &Request) -> Result<Option<Response>> {
        if request.method != Method::GET {
            return Ok(None);
        }
        let hash = hex_digest(request.cache_key().as_bytes());
        let Some(meta) = self.read_meta(&hash).await? else {
            return Ok(None);
        };
        let stored = meta_request(&meta)?;
        if !stored.matches(request) {
            return Ok(None);
        }

        let body = match tokio::fs::read(self.body_path(&hash)).await {
            Ok(body) => body,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::Corrupt(format!("missing body for {}", meta.url)));
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Some(Response {
            status: StatusCode::from_u16(meta.status)
                .map_err(|e| Error::Corrupt(format!("{}: {e}", meta.url)))?,
            headers: headers_from_pairs(&meta.headers)?,
            body: body.into(),
            url: parse_stored_url(&meta.response_url)?,
        }))
    }

    async fn put_all(&self, batch: Vec<(Request, Response)>) -> Result<()> {
        ensure_cacheable(&batch)?;
        if batch.is_empty() {
            return Ok(());
        }

        // A key repeated within the batch keeps its first position and last response.
        let mut unique: Vec<(String, Request, Response)> = Vec::with_capacity(batch.len());
        for (request, response) in batch {
            let hash = hex_digest(request.cache_key().as_bytes());
            if let Some(slot) = unique.iter_mut().find(|(h, ..)| *h == hash) {
                *slot = (hash, request, response);
            } else {
                unique.push((hash, request, response));
            }
        }

        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&self.dir).await?;

        let mut renames = Vec::with_capacity(unique.len() * 2);
        if let Err(e) = self.stage(unique, &mut renames).await {
            for (tmp, _) in &renames {
                if let Err(rm) = tokio::fs::remove_file(tmp).await
                    && rm.kind() != ErrorKind::NotFound
                {
                    log::warn!("Could not remove {}: {rm}", tmp.display());
                }
            }
            return Err(e);
        }

        for (from, to) in renames {
            tokio::fs::rename(&from, &to).await?;
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<Request>> {
        self.read_all_meta().await?.iter().map(meta_request).collect()
    }
}

async fn read_meta_file(path: &Path) -> Result<Option<EntryMeta>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| Error::Corrupt(format!("{}: {e}", path.display()))),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn meta_request(meta: &EntryMeta) -> Result<Request> {
    let method = Method::from_bytes(meta.method.as_bytes())
        .map_err(|e| Error::Corrupt(format!("{}: {e}", meta.url)))?;
    Ok(Request::get(parse_stored_url(&meta.url)?)
        .with_method(method)
        .with_headers(headers_from_pairs(&meta.request_headers)?))
}

fn parse_stored_url(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|e| Error::Corrupt(format!("{url}: {e}")))
}

fn headers_to_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

fn headers_from_pairs(pairs: &[(String, String)]) -> Result<HeaderMap> {
    let mut headers = HeaderMap::with_capacity(pairs.len());
    for (name, value) in pairs {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::Corrupt(format!("header {name}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::Corrupt(format!("header {name}: {e}")))?;
        headers.append(name, value);
    }
    Ok(headers)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

fn hex_digest(input: &[u8]) -> String {
    use std::fmt::Write;

    Sha256::digest(input)
        .iter()
        .fold(String::with_capacity(64), |mut out, byte| {
            let _ = write!(out, "{byte:02x}");
            out
        })
}
