// src/services/storage_client.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::errors::MockupError;
use crate::mockup::persistence::{
    MockupStore, SaveRequest, SavedMockup, SavedMockupRef, decode_data_url, encode_data_url,
};
use crate::mockup::scene::SceneConfig;

/// Saved mockups kept by the remote storage service.
pub struct StorageClient {
    base_url: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct SavedPayload {
    id: String,
    #[serde(default)]
    wall_analysis: Option<String>,
    mockup_image: String,
    config: SceneConfig,
    share_url: String,
    created_at: DateTime<Utc>,
}

impl StorageClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    async fn fetch_image(&self, url: &str) -> Result<(String, Vec<u8>), MockupError> {
        if url.starts_with("data:") {
            return decode_data_url(url);
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MockupError::Storage(format!("Image request failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(MockupError::Storage(format!(
                "Image request returned {}",
                response.status()
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/png")
            .to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| MockupError::Storage(format!("Failed to read image: {}", e)))?;

        Ok((content_type, bytes.to_vec()))
    }
}

#[async_trait]
impl MockupStore for StorageClient {
    async fn save(&self, request: SaveRequest) -> Result<SavedMockupRef, MockupError> {
        let response = self
            .client
            .post(format!("{}/save/", self.base_url))
            .json(&json!({
                "analysis_id": request.analysis_id,
                "mockup_image": encode_data_url(&request.raster_image),
                "config": request.config,
            }))
            .send()
            .await
            .map_err(|e| MockupError::Storage(format!("Save request failed: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(MockupError::Storage(format!("Save rejected: {}", error_text)));
        }

        response
            .json::<SavedMockupRef>()
            .await
            .map_err(|e| MockupError::Storage(format!("Failed to parse save response: {}", e)))
    }

    async fn load(&self, id: &str) -> Result<SavedMockup, MockupError> {
        let response = self
            .client
            .get(format!("{}/{}/", self.base_url, id))
            .send()
            .await
            .map_err(|e| MockupError::Storage(format!("Load request failed: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(MockupError::NotFound(format!("mockup {}", id)));
        }
        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(MockupError::Storage(format!("Load failed: {}", error_text)));
        }

        let payload: SavedPayload = response
            .json()
            .await
            .map_err(|e| MockupError::Storage(format!("Failed to parse mockup: {}", e)))?;
        let (content_type, raster_image) = self.fetch_image(&payload.mockup_image).await?;

        Ok(SavedMockup {
            id: payload.id,
            analysis_id: payload.wall_analysis.unwrap_or_default(),
            raster_image,
            content_type,
            config: payload.config,
            share_url: payload.share_url,
            created_at: payload.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saved_payload_shape() {
        let body = r#"{
            "id": "0b1e",
            "wall_analysis": "5f0c",
            "mockup_image": "https://media.test/mockups/saved/mockup_1.png",
            "config": {"prints": [], "wall_height_feet": 8.0},
            "share_url": "https://store.test/mockup/0b1e",
            "created_at": "2026-03-04T05:06:07Z"
        }"#;
        let payload: SavedPayload = serde_json::from_str(body).unwrap();
        assert_eq!(payload.wall_analysis.as_deref(), Some("5f0c"));
        assert!(payload.config.prints.is_empty());
    }

    #[tokio::test]
    async fn test_inline_image_needs_no_request() {
        let client = StorageClient::new("http://storage.invalid");
        let (content_type, bytes) = client
            .fetch_image(&encode_data_url(&[9, 8, 7]))
            .await
            .unwrap();
        assert_eq!(content_type, "image/png");
        assert_eq!(bytes, vec![9, 8, 7]);
    }
}
