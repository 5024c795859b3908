// src/services/image_processor.rs
use crate::errors::MockupError;
use bytes::Bytes;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageOutputFormat};
use log::debug;

pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const MAX_DIMENSION: u32 = 8192;
pub const SUBMIT_MAX_EDGE: u32 = 4096;
pub const ALLOWED_CONTENT_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/webp"];

/// A wall photo that passed validation and is ready to submit.
#[derive(Debug, Clone)]
pub struct WallUpload {
    pub filename: String,
    pub content_type: String,
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
}

pub struct ImageProcessor;

impl ImageProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Rejects anything that should never reach the detection service.
    pub fn validate_upload(
        &self,
        filename: &str,
        content_type: &str,
        data: &[u8],
    ) -> Result<WallUpload, MockupError> {
        if data.is_empty() {
            return Err(MockupError::Validation("No image provided".to_string()));
        }
        if data.len() > MAX_UPLOAD_BYTES {
            return Err(MockupError::Validation(
                "Image too large (max 10MB)".to_string(),
            ));
        }
        if !ALLOWED_CONTENT_TYPES.contains(&content_type) {
            return Err(MockupError::Validation(
                "Invalid image type. Allowed: JPEG, PNG, WebP".to_string(),
            ));
        }

        let sniffed = image::guess_format(data)
            .map_err(|e| MockupError::Validation(format!("Unrecognised image data: {}", e)))?;
        if content_type_for(sniffed) != Some(content_type) {
            return Err(MockupError::Validation(format!(
                "Declared {} but data looks like {:?}",
                content_type, sniffed
            )));
        }

        let img = image::load_from_memory_with_format(data, sniffed)
            .map_err(|e| MockupError::ImageProcessing(format!("Invalid image format: {}", e)))?;
        let (width, height) = img.dimensions();

        if width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(MockupError::Validation(format!(
                "Image dimensions exceed {}x{}",
                MAX_DIMENSION, MAX_DIMENSION
            )));
        }

        let (data, content_type, width, height) = self.resize_if_needed(img, sniffed, data)?;

        Ok(WallUpload {
            filename: filename.to_string(),
            content_type,
            data,
            width,
            height,
        })
    }

    fn resize_if_needed(
        &self,
        img: DynamicImage,
        format: ImageFormat,
        original: &[u8],
    ) -> Result<(Bytes, String, u32, u32), MockupError> {
        let (width, height) = img.dimensions();

        if width <= SUBMIT_MAX_EDGE && height <= SUBMIT_MAX_EDGE {
            let content_type = content_type_for(format).unwrap_or("image/png");
            return Ok((
                Bytes::copy_from_slice(original),
                content_type.to_string(),
                width,
                height,
            ));
        }

        let ratio = (SUBMIT_MAX_EDGE as f32 / width.max(height) as f32).min(1.0);
        let new_width = ((width as f32 * ratio) as u32).max(1);
        let new_height = ((height as f32 * ratio) as u32).max(1);
        debug!(
            "Downscaling wall photo {}x{} -> {}x{}",
            width, height, new_width, new_height
        );

        let resized = img.resize(new_width, new_height, image::imageops::FilterType::Lanczos3);
        let (output_format, content_type) = match format {
            ImageFormat::Jpeg => (ImageOutputFormat::Jpeg(90), "image/jpeg"),
            _ => (ImageOutputFormat::Png, "image/png"),
        };

        let mut output = Vec::new();
        resized
            .write_to(&mut std::io::Cursor::new(&mut output), output_format)
            .map_err(|e| {
                MockupError::ImageProcessing(format!("Failed to encode resized image: {}", e))
            })?;

        let (w, h) = resized.dimensions();
        Ok((Bytes::from(output), content_type.to_string(), w, h))
    }
}

fn content_type_for(format: ImageFormat) -> Option<&'static str> {
    match format {
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::Png => Some("image/png"),
        ImageFormat::WebP => Some("image/webp"),
        _ => None,
    }
}
