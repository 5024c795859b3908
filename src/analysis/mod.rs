// src/analysis/mod.rs
pub mod detection;
pub mod poller;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{MockupError, Result};
use crate::models::ImageRef;

pub use detection::{DetectionService, HttpDetectionClient};
pub use poller::{AnalysisPoller, PollConfig};

pub const DEFAULT_CEILING_HEIGHT_FEET: f64 = 8.0;
pub const MIN_CEILING_HEIGHT_FEET: f64 = 4.0;
pub const MAX_CEILING_HEIGHT_FEET: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Manual,
}

impl AnalysisStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AnalysisStatus::Completed | AnalysisStatus::Failed | AnalysisStatus::Manual
        )
    }

    /// Terminal states that carry a usable wall region.
    pub fn is_usable(self) -> bool {
        matches!(self, AnalysisStatus::Completed | AnalysisStatus::Manual)
    }

    pub fn can_transition_to(self, next: AnalysisStatus) -> bool {
        use AnalysisStatus::*;
        if self == next {
            return true;
        }
        match self {
            Pending => true,
            Processing => next != Pending,
            // Users may swap a finished detection for their own bounds.
            Completed => next == Manual,
            Failed | Manual => false,
        }
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AnalysisStatus::Pending => "pending",
            AnalysisStatus::Processing => "processing",
            AnalysisStatus::Completed => "completed",
            AnalysisStatus::Failed => "failed",
            AnalysisStatus::Manual => "manual",
        };
        f.write_str(s)
    }
}

/// Paintable wall region in source-image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WallBounds {
    pub top: f64,
    pub bottom: f64,
    pub left: f64,
    pub right: f64,
}

impl WallBounds {
    pub fn whole_image(width: u32, height: u32) -> Self {
        Self {
            top: 0.0,
            bottom: height as f64,
            left: 0.0,
            right: width as f64,
        }
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.left + self.right) / 2.0, (self.top + self.bottom) / 2.0)
    }

    pub fn is_valid(&self) -> bool {
        [self.top, self.bottom, self.left, self.right]
            .iter()
            .all(|v| v.is_finite())
            && self.height() > 0.0
            && self.width() > 0.0
    }

    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.top >= 0.0
            && self.left >= 0.0
            && self.bottom <= height as f64
            && self.right <= width as f64
    }
}

/// Where an analysis record is maintained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisOrigin {
    Service,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WallAnalysis {
    pub id: String,
    pub status: AnalysisStatus,
    pub origin: AnalysisOrigin,
    pub source_image: ImageRef,
    pub image_width: Option<u32>,
    pub image_height: Option<u32>,
    pub wall_bounds: Option<WallBounds>,
    /// Scale reported by the detection service, if any.
    pub pixels_per_inch: Option<f64>,
    pub confidence: Option<f64>,
    pub ceiling_height_feet: f64,
    pub error_message: Option<String>,
}

/// One reading of an analysis as reported by the detection service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSnapshot {
    pub id: String,
    pub status: AnalysisStatus,
    #[serde(default)]
    pub original_image: Option<String>,
    #[serde(default)]
    pub original_width: Option<u32>,
    #[serde(default)]
    pub original_height: Option<u32>,
    #[serde(default)]
    pub wall_bounds: Option<WallBounds>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub pixels_per_inch: Option<f64>,
    #[serde(default = "default_ceiling_height")]
    pub wall_height_feet: f64,
    #[serde(default)]
    pub error_message: Option<String>,
}

fn default_ceiling_height() -> f64 {
    DEFAULT_CEILING_HEIGHT_FEET
}

impl WallAnalysis {
    /// A locally maintained analysis that skips detection and treats the whole
    /// photo as wall. Preset walls enter through here as well.
    pub fn manual(
        source_image: ImageRef,
        width: u32,
        height: u32,
        ceiling_height_feet: f64,
    ) -> Result<Self> {
        validate_ceiling_height(ceiling_height_feet)?;
        if width == 0 || height == 0 {
            return Err(MockupError::Validation(
                "wall image has zero dimensions".to_string(),
            ));
        }

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            status: AnalysisStatus::Manual,
            origin: AnalysisOrigin::Local,
            source_image,
            image_width: Some(width),
            image_height: Some(height),
            wall_bounds: Some(WallBounds::whole_image(width, height)),
            pixels_per_inch: None,
            confidence: None,
            ceiling_height_feet,
            error_message: None,
        })
    }

    /// Bounds usable for placement: detected bounds when valid, otherwise the
    /// whole image once the analysis has reached a usable state.
    pub fn resolved_bounds(&self) -> Option<WallBounds> {
        if let Some(bounds) = self.wall_bounds.filter(WallBounds::is_valid) {
            return Some(bounds);
        }
        if !self.status.is_usable() {
            return None;
        }
        match (self.image_width, self.image_height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some(WallBounds::whole_image(w, h)),
            _ => None,
        }
    }

    /// Confidence is only meaningful for a completed detection.
    pub fn detection_confidence(&self) -> Option<f64> {
        match self.status {
            AnalysisStatus::Completed => self.confidence,
            _ => None,
        }
    }

    /// Build the local record for a freshly submitted analysis. A service-hosted
    /// copy of the photo takes precedence over the uploaded bytes.
    pub fn from_snapshot(snapshot: AnalysisSnapshot, uploaded: ImageRef) -> Self {
        let source_image = snapshot
            .original_image
            .clone()
            .filter(|url| !url.is_empty())
            .map(|url| ImageRef::url(url))
            .unwrap_or(uploaded);

        let mut analysis = Self {
            id: snapshot.id.clone(),
            status: snapshot.status,
            origin: AnalysisOrigin::Service,
            source_image,
            image_width: None,
            image_height: None,
            wall_bounds: None,
            pixels_per_inch: None,
            confidence: None,
            ceiling_height_feet: DEFAULT_CEILING_HEIGHT_FEET,
            error_message: None,
        };
        analysis.copy_fields(snapshot);
        analysis
    }

    /// Apply a newer snapshot of the same analysis. Nothing changes on error.
    pub fn absorb(&mut self, snapshot: AnalysisSnapshot) -> Result<()> {
        if snapshot.id != self.id {
            return Err(MockupError::Detection(format!(
                "snapshot for analysis {} applied to {}",
                snapshot.id, self.id
            )));
        }
        if !self.status.can_transition_to(snapshot.status) {
            return Err(MockupError::InvalidTransition {
                from: self.status,
                to: snapshot.status,
            });
        }
        self.status = snapshot.status;
        self.copy_fields(snapshot);
        Ok(())
    }

    fn copy_fields(&mut self, snapshot: AnalysisSnapshot) {
        self.image_width = snapshot.original_width.or(self.image_width);
        self.image_height = snapshot.original_height.or(self.image_height);
        self.wall_bounds = snapshot.wall_bounds;
        self.pixels_per_inch = snapshot.pixels_per_inch.filter(|s| s.is_finite() && *s > 0.0);
        self.confidence = snapshot.confidence;
        self.ceiling_height_feet = snapshot.wall_height_feet;
        self.error_message = snapshot.error_message.filter(|m| !m.is_empty());
    }

    /// User-drawn bounds replace detection and switch the analysis to manual.
    pub fn set_manual_bounds(&mut self, bounds: WallBounds) -> Result<()> {
        self.check_bounds(&bounds)?;
        if !self.status.can_transition_to(AnalysisStatus::Manual) {
            return Err(MockupError::InvalidTransition {
                from: self.status,
                to: AnalysisStatus::Manual,
            });
        }
        self.status = AnalysisStatus::Manual;
        self.wall_bounds = Some(bounds);
        // A service scale was measured against the old bounds.
        self.pixels_per_inch = None;
        Ok(())
    }

    /// User bounds must be ordered and lie inside the photo when its size is known.
    pub fn check_bounds(&self, bounds: &WallBounds) -> Result<()> {
        if !bounds.is_valid() {
            return Err(MockupError::Validation(
                "wall bounds need bottom > top and right > left".to_string(),
            ));
        }
        if let (Some(w), Some(h)) = (self.image_width, self.image_height) {
            if !bounds.fits_within(w, h) {
                return Err(MockupError::Validation(format!(
                    "wall bounds must lie inside the {}x{} photo",
                    w, h
                )));
            }
        }
        Ok(())
    }
}

pub fn validate_ceiling_height(feet: f64) -> Result<()> {
    if (MIN_CEILING_HEIGHT_FEET..=MAX_CEILING_HEIGHT_FEET).contains(&feet) {
        Ok(())
    } else {
        Err(MockupError::Validation(format!(
            "ceiling height must be between {} and {} feet, got {}",
            MIN_CEILING_HEIGHT_FEET, MAX_CEILING_HEIGHT_FEET, feet
        )))
    }
}
