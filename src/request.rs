//! Request and response values passed between the worker, the cache and the network.

use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use url::Url;

use crate::error::{Error, Result};

/// An intercepted outgoing request.
///
/// Only the method and the URL (without fragment) take part in cache lookups.
/// Headers and body are carried so a cache miss can be forwarded unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// HTTP method.
    pub method: Method,
    /// Absolute request URL.
    pub url: Url,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body. Empty for `GET`.
    pub body: Bytes,
}

impl Request {
    /// Creates a `GET` request for an absolute URL.
    #[must_use]
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Resolves `path` against `scope` and creates a `GET` request for it.
    ///
    /// Absolute URLs are accepted as-is.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if the path cannot be resolved.
    pub fn resolve(scope: &Url, path: &str) -> Result<Self> {
        scope
            .join(path)
            .map(Self::get)
            .map_err(|source| Error::InvalidUrl {
                input: path.to_string(),
                source,
            })
    }

    /// Returns a copy of this request with a different method.
    #[must_use]
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Returns a copy of this request with the given headers.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Returns a copy of this request with the given body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// The string the cache uses to identify this request: method and URL
    /// with any fragment removed.
    #[must_use]
    pub fn cache_key(&self) -> String {
        format!("{} {}", self.method, key_url(&self.url))
    }

    /// Returns true if a stored request `self` answers `other`.
    ///
    /// Only `GET` requests match. URLs are compared without fragments.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        self.method == Method::GET
            && other.method == Method::GET
            && key_url(&self.url) == key_url(&other.url)
    }
}

fn key_url(url: &Url) -> &str {
    let full = url.as_str();
    full.find('#').map_or(full, |idx| &full[..idx])
}

/// A response, either produced by the network or read back from a cache store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Full response body.
    pub body: Bytes,
    /// URL the response was produced for.
    pub url: Url,
}

impl Response {
    /// Creates a `200 OK` response with the given body.
    #[must_use]
    pub fn ok(url: Url, body: impl Into<Bytes>) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: body.into(),
            url,
        }
    }

    /// Returns a copy of this response with a different status.
    #[must_use]
    pub const fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Returns true for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn scope() -> Url {
        Url::parse("https://example.com/app/").unwrap()
    }

    #[test]
    fn resolve_relative_paths_against_scope() {
        let root = Request::resolve(&scope(), "./").unwrap();
        assert_eq!(root.url.as_str(), "https://example.com/app/");

        let index = Request::resolve(&scope(), "./index.html").unwrap();
        assert_eq!(index.url.as_str(), "https://example.com/app/index.html");
        assert_eq!(index.method, Method::GET);
    }

    #[test]
    fn resolve_accepts_absolute_urls() {
        let req = Request::resolve(&scope(), "https://cdn.example.org/lib.js").unwrap();
        assert_eq!(req.url.as_str(), "https://cdn.example.org/lib.js");
    }

    #[test]
    fn resolve_rejects_garbage() {
        let err = Request::resolve(&scope(), "http://[::1").unwrap_err();
        assert!(matches!(err, Error::InvalidUrl { .. }));
        assert!(err.to_string().contains("http://[::1"));
    }

    #[test]
    fn non_get_never_matches() {
        let get = Request::resolve(&scope(), "index.html").unwrap();
        let post = get.clone().with_method(Method::POST);
        assert!(get.matches(&get));
        assert!(!get.matches(&post));
        assert!(!post.matches(&post));
    }

    #[test]
    fn query_is_part_of_the_key() {
        let plain = Request::resolve(&scope(), "index.html").unwrap();
        let query = Request::resolve(&scope(), "index.html?v=2").unwrap();
        assert!(!plain.matches(&query));
    }

    #[test]
    fn body_is_not_part_of_the_key() {
        let get = Request::resolve(&scope(), "index.html").unwrap();
        let with_body = get.clone().with_body("payload");
        assert_eq!(get.cache_key(), with_body.cache_key());
        assert!(get.matches(&with_body));
    }

    #[test]
    fn cache_key_drops_fragment() {
        let req = Request::resolve(&scope(), "index.html#top").unwrap();
        assert_eq!(req.cache_key(), "GET https://example.com/app/index.html");
    }

    #[test]
    fn response_success() {
        let ok = Response::ok(scope(), "hi");
        assert!(ok.is_success());
        assert!(!ok.with_status(StatusCode::NOT_FOUND).is_success());
    }

    proptest! {
        #[test]
        fn fragment_never_affects_matching(path in "[a-z]{1,12}(\\.[a-z]{2,4})?", frag in "[a-z0-9]{0,8}") {
            let plain = Request::resolve(&scope(), &path).unwrap();
            let with_frag = Request::resolve(&scope(), &format!("{path}#{frag}")).unwrap();
            prop_assert!(plain.matches(&with_frag));
            prop_assert!(with_frag.matches(&plain));
            prop_assert_eq!(plain.cache_key(), with_frag.cache_key());
        }
    }
}
