//! Live network access behind a trait, so the worker can be tested without sockets.

use std::time::Duration;

use async_trait::async_trait;

use crate::config::NetworkConfig;
use crate::error::Result;
use crate::request::{Request, Response};

/// Performs live network retrievals.
#[async_trait]
pub trait Network: Send + Sync {
    /// Sends `request` and returns the full response, whatever its status.
    ///
    /// Only transport failures are errors.
    async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// [`Network`] implementation backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpNetwork {
    client: reqwest::Client,
}

impl HttpNetwork {
    /// Wraps an existing client.
    #[must_use]
    pub const fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Builds a client tuned for fetching application assets.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn from_config(config: &NetworkConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        let response = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone())
            .body(request.body.clone())
            .send()
            .await?;

        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response.bytes().await?;

        Ok(Response {
            status,
            headers,
            body,
            url,
        })
    }
}
