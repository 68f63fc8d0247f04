//! Error types for tether-bridge

use thiserror::Error;

/// Result type alias using tether-bridge Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to the IDE host
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The host replied with `success: false`
    #[error("host rejected '{action}': {message}")]
    Host { action: String, message: String },

    /// A reply arrived but did not match the expected shape
    #[error("unexpected reply for '{action}': {detail}")]
    UnexpectedReply { action: String, detail: String },

    /// An intermediate chunk was not acknowledged
    #[error("chunk {index}/{total} not acknowledged: {message}")]
    ChunkRejected {
        index: usize,
        total: usize,
        message: String,
    },

    /// Server-sent events error
    #[error("SSE error: {0}")]
    Sse(String),

    /// The notification channel closed before the expected event arrived
    #[error("host notification channel closed")]
    ChannelClosed,
}

impl Error {
    /// Create a host-rejection error from an action and message
    pub fn host(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Host {
            action: action.into(),
            message: message.into(),
        }
    }

    /// Check if this error means the host is unreachable (transport layer)
    /// rather than a structured rejection. Callers use this to decide
    /// between "host unavailable, skip enrichment" and "host said no".
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Http(_) | Error::Sse(_) | Error::ChannelClosed
        )
    }

    /// Check if this error is a structured rejection from the host
    pub fn is_host_rejection(&self) -> bool {
        matches!(self, Error::Host { .. } | Error::ChunkRejected { .. })
    }
}
