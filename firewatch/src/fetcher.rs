//! Frame fetching from still-image cameras.
//!
use std::time::Duration;

use futures::future::BoxFuture;
use image::RgbImage;
use reqwest::{Client, StatusCode};
use thiserror::Error;

/// Reasons why a camera did not deliver a usable frame.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("camera answered with status {0}")]
    Status(StatusCode),
    #[error("camera sent an empty body")]
    EmptyBody,
    #[error("body is not a decodable image: {0}")]
    Decode(#[from] image::ImageError),
}

impl FetchError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Request(err) if err.is_timeout())
    }
}

pub type FetchResult = Result<RgbImage, FetchError>;

/// Source of still frames, addressed by URL.
pub trait FrameSource: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a str, timeout: Duration) -> BoxFuture<'a, FetchResult>;
}

/// Fetch frames with plain HTTP GET requests.
#[derive(Clone, Debug, Default)]
pub struct HttpFrameSource {
    client: Client,
}

impl HttpFrameSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Get one frame. There is no retry, the caller decides when to ask again.
    pub async fn fetch_frame(&self, url: &str, timeout: Duration) -> FetchResult {
        let resp = self.client.get(url).timeout(timeout).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let body = resp.bytes().await?;
        log::trace!("Received {} bytes from {}", body.len(), url);

        decode_frame(&body)
    }
}

impl FrameSource for HttpFrameSource {
    fn fetch<'a>(&'a self, url: &'a str, timeout: Duration) -> BoxFuture<'a, FetchResult> {
        Box::pin(self.fetch_frame(url, timeout))
    }
}

/// Decode an encoded image (JPEG from the cameras) into an RGB frame.
pub fn decode_frame(data: &[u8]) -> FetchResult {
    if data.is_empty() {
        return Err(FetchError::EmptyBody);
    }

    Ok(image::load_from_memory(data)?.to_rgb8())
}
