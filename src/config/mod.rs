//! Configuration types for the cache, the network and the server.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};
use crate::manifest::{ASSETS, AssetManifest, CACHE_NAME};

/// Default scope the asset paths are resolved against.
pub const DEFAULT_SCOPE: &str = "http://127.0.0.1:8080/";

/// Default port of the offline-first server.
pub const DEFAULT_SERVER_PORT: u16 = 9724;

/// Cache store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Name of the cache store populated on install.
    pub name: String,
    /// Asset paths pre-cached on install.
    pub assets: Vec<String>,
    /// Root directory of the on-disk cache storage.
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            name: CACHE_NAME.to_string(),
            assets: ASSETS.iter().map(|s| (*s).to_string()).collect(),
            dir: dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("asset-cache"),
        }
    }
}

impl CacheConfig {
    /// Returns the install manifest described by this configuration.
    #[must_use]
    pub fn manifest(&self) -> AssetManifest {
        AssetManifest::new(self.name.clone(), self.assets.clone())
    }
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Base URL asset paths and served paths are resolved against.
    pub scope: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Number of assets fetched concurrently during install.
    pub concurrent_fetches: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            scope: DEFAULT_SCOPE.to_string(),
            timeout_secs: 30,
            concurrent_fetches: 4,
        }
    }
}

impl NetworkConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the scope URL.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub const fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Sets the number of concurrent install fetches.
    #[must_use]
    pub const fn with_concurrent_fetches(mut self, concurrent: usize) -> Self {
        self.concurrent_fetches = concurrent;
        self
    }

    /// Parses the scope into a URL.
    ///
    /// A scope without a trailing slash is treated as a directory, so
    /// `https://host/app` and `https://host/app/` resolve assets the same way.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if the scope is not an absolute URL.
    pub fn scope_url(&self) -> Result<Url> {
        let mut scope = self.scope.clone();
        if !scope.ends_with('/') {
            scope.push('/');
        }
        Url::parse(&scope).map_err(|source| Error::InvalidUrl {
            input: self.scope.clone(),
            source,
        })
    }
}

/// Offline-first server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_SERVER_PORT,
        }
    }
}

/// Complete application configuration combining cache, network and server settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Cache configuration.
    pub cache: CacheConfig,
    /// Network configuration.
    pub network: NetworkConfig,
    /// Server configuration.
    pub server: ServerConfig,
}

impl AppConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a TOML file. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Loads configuration from `path` if given, otherwise returns defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a given file cannot be read or parsed.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the string is not valid configuration.
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))
    }
}
