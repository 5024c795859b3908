// src/services/catalog_client.rs
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::errors::MockupError;
use crate::models::{ImageRef, Orientation, Photo, PrintVariant};

/// Read-only access to photographs and their print variants.
#[async_trait]
pub trait CatalogService: Send + Sync {
    async fn photo(&self, id: u64) -> Result<Photo, MockupError>;
}

pub struct HttpCatalogClient {
    base_url: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct PhotoPayload {
    id: u64,
    title: String,
    image: String,
    orientation: Orientation,
    #[serde(default)]
    image_width: Option<u32>,
    #[serde(default)]
    image_height: Option<u32>,
    #[serde(default)]
    variants: Vec<VariantPayload>,
}

#[derive(Debug, Deserialize)]
struct VariantPayload {
    id: u64,
    size: String,
    material: String,
    width_inches: f64,
    height_inches: f64,
    price: String,
    #[serde(default = "available")]
    is_available: bool,
}

fn available() -> bool {
    true
}

impl From<PhotoPayload> for Photo {
    fn from(p: PhotoPayload) -> Self {
        Photo {
            id: p.id,
            title: p.title,
            image: ImageRef::url(p.image),
            orientation: p.orientation,
            image_width: p.image_width,
            image_height: p.image_height,
            variants: p
                .variants
                .into_iter()
                .filter(|v| v.is_available)
                .map(|v| PrintVariant {
                    id: v.id,
                    size: v.size,
                    material: v.material,
                    width_inches: v.width_inches,
                    height_inches: v.height_inches,
                    price: v.price,
                })
                .collect(),
        }
    }
}

impl HttpCatalogClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }
}

#[async_trait]
impl CatalogService for HttpCatalogClient {
    async fn photo(&self, id: u64) -> Result<Photo, MockupError> {
        let response = self
            .client
            .get(format!("{}/photos/{}/", self.base_url, id))
            .send()
            .await
            .map_err(|e| MockupError::Catalog(format!("Photo request failed: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(MockupError::NotFound(format!("photo {}", id)));
        }
        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(MockupError::Catalog(format!("Catalog error: {}", error_text)));
        }

        let payload: PhotoPayload = response
            .json()
            .await
            .map_err(|e| MockupError::Catalog(format!("Failed to parse photo: {}", e)))?;

        Ok(payload.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_variants_are_dropped() {
        let body = r#"{
            "id": 42,
            "title": "Salt Flats",
            "slug": "salt-flats",
            "image": "https://media.test/photos/salt.jpg",
            "orientation": "H",
            "image_width": 6000,
            "image_height": 4000,
            "variants": [
                {"id": 1, "size": "24x16", "material": "aluminum", "width_inches": 24,
                 "height_inches": 16, "price": "675.00", "is_available": true},
                {"id": 2, "size": "60x40", "material": "aluminum", "width_inches": 60,
                 "height_inches": 40, "price": "3400.00", "is_available": false}
            ]
        }"#;
        let payload: PhotoPayload = serde_json::from_str(body).unwrap();
        let photo: Photo = payload.into();

        assert_eq!(photo.variants.len(), 1);
        assert_eq!(photo.variants[0].size, "24x16");
        assert!((photo.aspect_ratio() - 1.5).abs() < 1e-9);
    }
}
