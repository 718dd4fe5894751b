//! Upstream frame acquisition
//!
//! One still image per request, pulled from the image-proxy endpoint of
//! the primary application server. The trait seam exists so the streaming
//! loop can be exercised against a mock source in tests.

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::{VideoConfig, UPSTREAM_TIMEOUT};
use crate::error::{Result, VideoError};

/// A source of raw still-image bytes for a camera entity
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Fetch one raw frame for `entity_id`
    ///
    /// Any failure (non-200 status, timeout, transport error) classifies
    /// as upstream-unavailable; callers skip the tick and move on.
    async fn fetch(&self, entity_id: &str) -> Result<Bytes>;
}

/// Frame source backed by the `/api/camera_proxy/{entity_id}` endpoint
pub struct CameraProxySource {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl CameraProxySource {
    /// Create a source for the configured upstream.
    ///
    /// Fails only if the HTTP client cannot be constructed (TLS backend
    /// init); a fallback client would lose the request timeout bound, so
    /// the error propagates instead.
    pub fn new(config: &VideoConfig) -> Result<Self> {
        // Timeout lives on the client so every request is bounded
        let client = reqwest::Client::builder()
            .timeout(UPSTREAM_TIMEOUT)
            .build()
            .map_err(|e| VideoError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }
}

#[async_trait]
impl FrameSource for CameraProxySource {
    async fn fetch(&self, entity_id: &str) -> Result<Bytes> {
        let url = format!("{}/api/camera_proxy/{}", self.base_url, entity_id);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(VideoError::UpstreamStatus(response.status()));
        }

        Ok(response.bytes().await?)
    }
}
