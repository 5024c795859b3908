// src/models.rs
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Where an image lives: a fetchable URL or bytes held in memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageRef {
    Url { url: String },
    Inline {
        content_type: String,
        #[serde(skip)]
        data: Bytes,
    },
}

impl ImageRef {
    pub fn url(url: impl Into<String>) -> Self {
        ImageRef::Url { url: url.into() }
    }

    pub fn inline(content_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        ImageRef::Inline {
            content_type: content_type.into(),
            data: data.into(),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ImageRef::Url { url } => url.clone(),
            ImageRef::Inline { content_type, data } => {
                format!("inline {} ({} bytes)", content_type, data.len())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    #[serde(rename = "H")]
    Horizontal,
    #[serde(rename = "V")]
    Vertical,
    #[serde(rename = "S")]
    Square,
}

impl Orientation {
    pub fn fallback_ratio(self) -> f64 {
        match self {
            Orientation::Horizontal => 3.0 / 2.0,
            Orientation::Vertical => 2.0 / 3.0,
            Orientation::Square => 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintVariant {
    pub id: u64,
    pub size: String,
    pub material: String,
    pub width_inches: f64,
    pub height_inches: f64,
    pub price: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Photo {
    pub id: u64,
    pub title: String,
    pub image: ImageRef,
    pub orientation: Orientation,
    pub image_width: Option<u32>,
    pub image_height: Option<u32>,
    #[serde(default)]
    pub variants: Vec<PrintVariant>,
}

impl Photo {
    /// Width over height of the source photograph.
    pub fn aspect_ratio(&self) -> f64 {
        match (self.image_width, self.image_height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => w as f64 / h as f64,
            _ => self.orientation.fallback_ratio(),
        }
    }

    pub fn variant(&self, variant_id: u64) -> Option<&PrintVariant> {
        self.variants.iter().find(|v| v.id == variant_id)
    }
}
