//! Error types for tether-intercept

use thiserror::Error;

/// Result type alias using tether-intercept Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the interception pipeline
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the host bridge layer
    #[error(transparent)]
    Bridge(#[from] tether_bridge::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The upstream (real network) call failed
    #[error("upstream error: {0}")]
    Upstream(String),

    /// A generic pipeline error
    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Upstream(e.to_string())
    }
}
