//! Crate error types
//!
//! Every failure in the relay is classified so callers can tell the
//! skip-this-tick conditions (upstream hiccups, undecodable frames) apart
//! from session-level transport errors. Nothing in this taxonomy is fatal
//! to the process.

use thiserror::Error;

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, VideoError>;

/// Errors that can occur while relaying camera frames
#[derive(Debug, Error)]
pub enum VideoError {
    /// Upstream image proxy answered with a non-200 status
    #[error("upstream returned HTTP {0}")]
    UpstreamStatus(reqwest::StatusCode),

    /// Upstream request failed (timeout, DNS, connection reset, ...)
    #[error("upstream request failed: {0}")]
    UpstreamTransport(#[from] reqwest::Error),

    /// Raw frame bytes could not be decoded or re-encoded
    #[error("frame codec error: {0}")]
    Codec(#[from] image::ImageError),

    /// Control or server message could not be (de)serialized
    #[error("malformed message: {0}")]
    Protocol(#[from] serde_json::Error),

    /// WebSocket transport error on a viewer connection
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Generic I/O error (listener bind, socket options)
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl VideoError {
    /// Whether this error only invalidates the current tick.
    ///
    /// Transient errors are logged and the streaming loop moves on to the
    /// next frame; anything else takes the loop's backoff path.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            VideoError::UpstreamStatus(_) | VideoError::UpstreamTransport(_) | VideoError::Codec(_)
        )
    }
}
