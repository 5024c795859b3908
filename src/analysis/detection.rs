// src/analysis/detection.rs
use async_trait::async_trait;
use log::debug;
use reqwest::{Client, multipart};
use serde_json::json;

use super::{AnalysisSnapshot, WallBounds};
use crate::errors::MockupError;
use crate::services::image_processor::WallUpload;

/// The external wall-detection service. Detection itself is opaque to us.
#[async_trait]
pub trait DetectionService: Send + Sync {
    async fn submit(&self, upload: &WallUpload) -> Result<AnalysisSnapshot, MockupError>;

    async fn fetch(&self, id: &str) -> Result<AnalysisSnapshot, MockupError>;

    async fn update_ceiling_height(
        &self,
        id: &str,
        feet: f64,
    ) -> Result<AnalysisSnapshot, MockupError>;

    async fn update_bounds(
        &self,
        id: &str,
        bounds: WallBounds,
    ) -> Result<AnalysisSnapshot, MockupError>;
}

pub struct HttpDetectionClient {
    base_url: String,
    client: Client,
}

impl HttpDetectionClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    fn analysis_url(&self, id: &str) -> String {
        format!("{}/analyze/{}/", self.base_url, id)
    }

    async fn read_snapshot(
        &self,
        response: reqwest::Response,
        action: &str,
    ) -> Result<AnalysisSnapshot, MockupError> {
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(MockupError::Detection(format!(
                "{} returned {}: {}",
                action, status, error_text
            )));
        }

        response
            .json::<AnalysisSnapshot>()
            .await
            .map_err(|e| MockupError::Detection(format!("Failed to parse {} response: {}", action, e)))
    }

    async fn patch(
        &self,
        id: &str,
        body: serde_json::Value,
        action: &str,
    ) -> Result<AnalysisSnapshot, MockupError> {
        let response = self
            .client
            .patch(self.analysis_url(id))
            .json(&body)
            .send()
            .await
            .map_err(|e| MockupError::Detection(format!("{} request failed: {}", action, e)))?;

        self.read_snapshot(response, action).await
    }
}

#[async_trait]
impl DetectionService for HttpDetectionClient {
    async fn submit(&self, upload: &WallUpload) -> Result<AnalysisSnapshot, MockupError> {
        let part = multipart::Part::bytes(upload.data.to_vec())
            .file_name(upload.filename.clone())
            .mime_str(&upload.content_type)
            .map_err(|e| MockupError::Validation(format!("Invalid content type: {}", e)))?;
        let form = multipart::Form::new().part("image", part);

        debug!(
            "Submitting wall photo {} ({} bytes)",
            upload.filename,
            upload.data.len()
        );

        let response = self
            .client
            .post(format!("{}/analyze/", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| MockupError::Detection(format!("Upload request failed: {}", e)))?;

        self.read_snapshot(response, "Upload").await
    }

    async fn fetch(&self, id: &str) -> Result<AnalysisSnapshot, MockupError> {
        let response = self
            .client
            .get(self.analysis_url(id))
            .send()
            .await
            .map_err(|e| MockupError::Detection(format!("Status request failed: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(MockupError::NotFound(format!("analysis {}", id)));
        }

        self.read_snapshot(response, "Status").await
    }

    async fn update_ceiling_height(
        &self,
        id: &str,
        feet: f64,
    ) -> Result<AnalysisSnapshot, MockupError> {
        self.patch(id, json!({ "wall_height_feet": feet }), "Ceiling update")
            .await
    }

    async fn update_bounds(
        &self,
        id: &str,
        bounds: WallBounds,
    ) -> Result<AnalysisSnapshot, MockupError> {
        self.patch(id, json!({ "wall_bounds": bounds }), "Bounds update")
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalysisStatus;

    #[test]
    fn test_snapshot_wire_shape() {
        let body = r#"{
            "id": "5f0c",
            "status": "completed",
            "original_image": "https://media.test/mockups/walls/a.jpg",
            "original_width": 1600,
            "original_height": 1200,
            "depth_map": null,
            "wall_bounds": {"top": 120, "bottom": 920, "left": 40, "right": 1500},
            "confidence": 0.74,
            "pixels_per_inch": 8.33,
            "wall_height_feet": 8.0,
            "error_message": "",
            "created_at": "2026-01-02T03:04:05Z"
        }"#;
        let snap: AnalysisSnapshot = serde_json::from_str(body).unwrap();
        assert_eq!(snap.status, AnalysisStatus::Completed);
        assert_eq!(snap.wall_bounds.map(|b| b.height()), Some(800.0));
        assert_eq!(snap.pixels_per_inch, Some(8.33));
    }

    #[test]
    fn test_minimal_snapshot_defaults() {
        let snap: AnalysisSnapshot =
            serde_json::from_str(r#"{"id": "x", "status": "pending"}"#).unwrap();
        assert_eq!(snap.wall_height_feet, 8.0);
        assert!(snap.wall_bounds.is_none());
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = HttpDetectionClient::new("http://detect.test/api/mockup/");
        assert_eq!(
            client.analysis_url("abc"),
            "http://detect.test/api/mockup/analyze/abc/"
        );
    }
}
