//! Error types for the asset-cache library.

use reqwest::{Method, StatusCode};
use thiserror::Error;

/// Errors that can occur while installing or serving cached assets.
#[derive(Error, Debug)]
pub enum Error {
    /// Network transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error in the on-disk cache backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An asset answered with a non-success status during add-all.
    #[error("Fetching {url} returned {status}")]
    BadStatus {
        /// URL of the failing asset.
        url: String,
        /// Status returned by the network.
        status: StatusCode,
    },

    /// The same request appeared twice in one add-all batch.
    #[error("Duplicate request in batch: {0}")]
    DuplicateRequest(String),

    /// Only `GET` requests can be stored.
    #[error("Cannot cache a {0} request")]
    UnsupportedMethod(Method),

    /// An asset path or scope could not be turned into an absolute URL.
    #[error("Invalid URL '{input}': {source}")]
    InvalidUrl {
        /// The text that failed to parse.
        input: String,
        /// Underlying parse error.
        source: url::ParseError,
    },

    /// Configuration file could not be parsed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A stored cache entry could not be decoded.
    #[error("Corrupt cache entry: {0}")]
    Corrupt(String),
}

/// A specialized `Result` type for asset-cache operations.
pub type Result<T> = std::result::Result<T, Error>;
