//! Cover image download and MIME sniffing

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};

use crate::{
    config::CoversConfig,
    error::{AppError, AppResult},
};

/// Source of cover image bytes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CoverFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> AppResult<Vec<u8>>;
}

/// Downloads covers over HTTP(S)
#[derive(Clone)]
pub struct HttpCoverFetcher {
    client: Client,
    max_bytes: usize,
}

impl HttpCoverFetcher {
    pub fn new(config: &CoversConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout_seconds))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_bytes: config.max_bytes,
        })
    }

    fn too_large(&self, seen: usize) -> AppError {
        tracing::warn!("Cover download aborted after {} bytes (limit {})", seen, self.max_bytes);
        AppError::BadRequest(format!("Cover image too large (over {} bytes)", self.max_bytes))
    }
}

/// Accept only absolute http(s) URLs
pub fn parse_cover_url(url: &str) -> AppResult<Url> {
    let parsed = Url::parse(url).map_err(|e| AppError::BadRequest(format!("Invalid URL: {}", e)))?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(AppError::BadRequest(format!("Invalid URL: unsupported scheme {}", other))),
    }
}

#[async_trait]
impl CoverFetcher for HttpCoverFetcher {
    async fn fetch(&self, url: &str) -> AppResult<Vec<u8>> {
        let url = parse_cover_url(url)?;
        tracing::debug!("Downloading cover from {}", url);

        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::BadRequest(format!("Failed to download cover: {}", e)))?;

        if let Some(length) = response.content_length() {
            if length > self.max_bytes as u64 {
                return Err(self.too_large(length as usize));
            }
        }

        // Content-Length may be absent or wrong, so count as we read
        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to download cover: {}", e)))?
        {
            if bytes.len() + chunk.len() > self.max_bytes {
                return Err(self.too_large(bytes.len() + chunk.len()));
            }
            bytes.extend_from_slice(&chunk);
        }

        tracing::info!("Downloaded cover from {} ({} bytes)", url, bytes.len());
        Ok(bytes)
    }
}

/// MIME type guessed from magic numbers
pub fn detect_mime(bytes: &[u8]) -> Option<&'static str> {
    infer::get(bytes).map(|kind| kind.mime_type())
}

/// Reject anything that does not sniff as an image
pub fn ensure_image(bytes: &[u8]) -> AppResult<&'static str> {
    if !infer::is_image(bytes) {
        return Err(AppError::BadRequest("Cover is not a recognised image".to_string()));
    }
    detect_mime(bytes).ok_or_else(|| AppError::BadRequest("Cover is not a recognised image".to_string()))
}
