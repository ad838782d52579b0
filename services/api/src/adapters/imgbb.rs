//! services/api/src/adapters/imgbb.rs
//!
//! ImgBB image hosting, the `ImageHost` port. Telegram photos are re-hosted here
//! so the page publisher gets a public URL.

use academy_core::ports::{ImageHost, PortError, PortResult};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as B64, Engine};
use serde::Deserialize;
use tracing::info;

const IMGBB_UPLOAD_URL: &str = "https://api.imgbb.com/1/upload";

#[derive(Clone)]
pub struct ImgbbAdapter {
    http: reqwest::Client,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct UploadResponse {
    #[serde(default)]
    success: bool,
    data: Option<UploadData>,
}

#[derive(Deserialize)]
struct UploadData {
    #[serde(default)]
    url: String,
}

impl ImgbbAdapter {
    pub fn new(http: reqwest::Client, api_key: Option<String>) -> Self {
        Self {
            http,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl ImageHost for ImgbbAdapter {
    async fn upload(&self, image: &[u8], name: &str) -> PortResult<String> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| PortError::Unavailable("IMGBB_API_KEY is not set".to_string()))?;

        let encoded = B64.encode(image);
        let response = self
            .http
            .post(IMGBB_UPLOAD_URL)
            .form(&[("key", key), ("image", encoded.as_str()), ("name", name)])
            .send()
            .await
            .map_err(|e| PortError::Upstream(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PortError::Upstream(format!("ImgBB answered {}", status.as_u16())));
        }
        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| PortError::Upstream(e.to_string()))?;

        let url = body
            .data
            .map(|d| d.url.trim().to_string())
            .filter(|u| body.success && !u.is_empty())
            .ok_or_else(|| PortError::Upstream("ImgBB upload failed".to_string()))?;
        info!(name, bytes = image.len(), "image hosted on ImgBB");
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_key_is_unavailable() {
        let adapter = ImgbbAdapter::new(reqwest::Client::new(), None);
        assert!(!adapter.is_configured());
        assert!(matches!(adapter.upload(b"jpeg", "x").await, Err(PortError::Unavailable(_))));
    }
}
