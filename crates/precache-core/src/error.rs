//! Error types for precache operations.

use thiserror::Error;

use crate::network::FetchError;

#[derive(Error, Debug)]
pub enum Error {
    /// A manifest asset could not be fetched, so nothing was cached.
    #[error("Install failed for {path}: {reason}")]
    Install { path: String, reason: String },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Cache not found: {0}")]
    CacheNotFound(String),

    #[error("Only GET requests can be cached, got {0}")]
    UnsupportedMethod(String),

    #[error("Partial (206) responses cannot be cached: {0}")]
    PartialResponse(String),

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Host rejected lifecycle request: {0}")]
    Host(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt cache file: {0}")]
    Corrupt(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Corrupt(e.to_string())
    }
}

impl From<base64::DecodeError> for Error {
    fn from(e: base64::DecodeError) -> Self {
        Error::Corrupt(e.to_string())
    }
}

/// A specialized `Result` type for precache operations.
pub type Result<T> = std::result::Result<T, Error>;
