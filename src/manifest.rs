//! The fixed set of assets pre-cached on install.

use url::Url;

use crate::error::Result;
use crate::request::Request;

/// Name of the cache store populated on install.
pub const CACHE_NAME: &str = "egui-template-pwa";

/// Asset paths pre-cached on install, relative to the scope.
pub const ASSETS: [&str; 4] = ["./", "./index.html", "./biobots.js", "./biobots_bg.wasm"];

/// Cache name plus the ordered list of asset paths seeded into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetManifest {
    cache_name: String,
    assets: Vec<String>,
}

impl Default for AssetManifest {
    fn default() -> Self {
        Self::new(CACHE_NAME, ASSETS.iter().map(|s| (*s).to_string()).collect())
    }
}

impl AssetManifest {
    #[must_use]
    pub fn new(cache_name: impl Into<String>, assets: Vec<String>) -> Self {
        Self {
            cache_name: cache_name.into(),
            assets,
        }
    }

    #[must_use]
    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    #[must_use]
    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    /// Resolves every asset path against `scope`, keeping manifest order.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidUrl`] for the first path that cannot be resolved.
    pub fn requests(&self, scope: &Url) -> Result<Vec<Request>> {
        self.assets
            .iter()
            .map(|path| Request::resolve(scope, path))
            .collect()
    }
}
