// src/services/image_loader.rs
use async_trait::async_trait;
use image::DynamicImage;
use log::debug;
use reqwest::Client;

use crate::errors::MockupError;
use crate::models::ImageRef;

#[async_trait]
pub trait ImageLoader: Send + Sync {
    async fn load(&self, image: &ImageRef) -> Result<DynamicImage, MockupError>;
}

/// Fetches URLs over HTTP and decodes inline bytes directly.
pub struct HttpImageLoader {
    client: Client,
}

impl HttpImageLoader {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

fn decode(data: &[u8], source: &str) -> Result<DynamicImage, MockupError> {
    image::load_from_memory(data)
        .map_err(|e| MockupError::ImageProcessing(format!("Failed to decode {}: {}", source, e)))
}

#[async_trait]
impl ImageLoader for HttpImageLoader {
    async fn load(&self, image: &ImageRef) -> Result<DynamicImage, MockupError> {
        match image {
            ImageRef::Inline { data, .. } => decode(data, "inline image"),
            ImageRef::Url { url } => {
                debug!("Fetching image {}", url);
                let response = self.client.get(url).send().await.map_err(|e| {
                    MockupError::ImageProcessing(format!("Failed to fetch {}: {}", url, e))
                })?;

                if !response.status().is_success() {
                    return Err(MockupError::ImageProcessing(format!(
                        "Fetching {} returned {}",
                        url,
                        response.status()
                    )));
                }

                let bytes = response.bytes().await.map_err(|e| {
                    MockupError::ImageProcessing(format!("Failed to read {}: {}", url, e))
                })?;
                decode(&bytes, url)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::image_processor::tests::png_bytes;
    use image::GenericImageView;

    #[tokio::test]
    async fn test_inline_images_decode_without_network() {
        let loader = HttpImageLoader::new();
        let img = loader
            .load(&ImageRef::inline("image/png", png_bytes(12, 8)))
            .await
            .unwrap();
        assert_eq!(img.dimensions(), (12, 8));
    }

    #[tokio::test]
    async fn test_inline_garbage_is_an_error() {
        let loader = HttpImageLoader::new();
        let err = loader
            .load(&ImageRef::inline("image/png", vec![1u8, 2, 3, 4]))
            .await
            .unwrap_err();
        assert!(matches!(err, MockupError::ImageProcessing(_)));
    }
}
