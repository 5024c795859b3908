// src/mockup/crop.rs
// Crop preview: which part of a photograph survives reproduction at a print's aspect ratio.
use serde::Serialize;

use crate::errors::{MockupError, Result};

/// Ratios closer than this are treated as the same shape.
pub const EXACT_FIT_TOLERANCE: f64 = 0.02;

/// Fraction of the source trimmed from each edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CropFractions {
    pub top: f64,
    pub bottom: f64,
    pub left: f64,
    pub right: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CropPreview {
    /// The print matches the photo; draw a plain selection border.
    ExactFit,
    Trim(CropFractions),
}

impl CropPreview {
    pub fn fractions(&self) -> CropFractions {
        match self {
            CropPreview::ExactFit => CropFractions::default(),
            CropPreview::Trim(f) => *f,
        }
    }

    pub fn is_exact_fit(&self) -> bool {
        matches!(self, CropPreview::ExactFit)
    }
}

/// Effective print ratio. Catalog sizes are listed landscape-first, so a vertical
/// source reads the print dimensions swapped.
pub fn effective_print_ratio(source_ratio: f64, print_width: f64, print_height: f64) -> f64 {
    if source_ratio < 1.0 {
        print_height / print_width
    } else {
        print_width / print_height
    }
}

pub fn crop_preview(source_ratio: f64, print_width: f64, print_height: f64) -> Result<CropPreview> {
    if !(source_ratio.is_finite() && source_ratio > 0.0) {
        return Err(MockupError::Validation(format!(
            "source aspect ratio must be positive, got {}",
            source_ratio
        )));
    }
    if !(print_width.is_finite() && print_width > 0.0 && print_height.is_finite() && print_height > 0.0)
    {
        return Err(MockupError::Validation(format!(
            "print dimensions must be positive, got {}x{}",
            print_width, print_height
        )));
    }

    let print_ratio = effective_print_ratio(source_ratio, print_width, print_height);

    if (print_ratio - source_ratio).abs() < EXACT_FIT_TOLERANCE {
        return Ok(CropPreview::ExactFit);
    }

    let fractions = if print_ratio > source_ratio {
        // Print is wider: keep full width, trim top and bottom.
        let trim = (1.0 - source_ratio / print_ratio) / 2.0;
        CropFractions {
            top: trim,
            bottom: trim,
            ..Default::default()
        }
    } else {
        let trim = (1.0 - print_ratio / source_ratio) / 2.0;
        CropFractions {
            left: trim,
            right: trim,
            ..Default::default()
        }
    };

    Ok(CropPreview::Trim(fractions))
}
