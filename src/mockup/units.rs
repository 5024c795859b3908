// src/mockup/units.rs
// Every conversion between physical units, source-image pixels and canvas pixels. Physical
// placement is stored in inches. Canvas geometry is always derived here and only flows back
// through Projection::to_inches when a drag is committed.
use crate::analysis::WallAnalysis;

/// Used when neither the service nor the wall bounds give a scale.
pub const DEFAULT_PIXELS_PER_INCH: f64 = 10.0;
pub const INCHES_PER_FOOT: f64 = 12.0;

pub fn feet_to_inches(feet: f64) -> f64 {
    feet * INCHES_PER_FOOT
}

/// Source-image pixels per physical inch on the wall.
///
/// Without a service-provided scale this assumes the wall bounds span floor to
/// ceiling. That is an approximation, not a measurement.
pub fn pixels_per_inch(analysis: &WallAnalysis) -> f64 {
    if let Some(scale) = analysis.pixels_per_inch.filter(|s| s.is_finite() && *s > 0.0) {
        return scale;
    }

    let ceiling_inches = feet_to_inches(analysis.ceiling_height_feet);
    match analysis.wall_bounds {
        Some(bounds) if bounds.height() > 0.0 && ceiling_inches > 0.0 => {
            bounds.height() / ceiling_inches
        }
        _ => DEFAULT_PIXELS_PER_INCH,
    }
}

pub fn to_pixels(inches: f64, scale: f64, canvas_scale_factor: f64) -> f64 {
    inches * scale * canvas_scale_factor
}

pub fn to_inches(pixels: f64, scale: f64, canvas_scale_factor: f64) -> f64 {
    pixels / (scale * canvas_scale_factor)
}

/// Ratio of displayed canvas width to source photo width.
pub fn canvas_scale_factor(canvas_width: u32, source_width: u32) -> f64 {
    if source_width == 0 {
        1.0
    } else {
        canvas_width as f64 / source_width as f64
    }
}

/// The scale pair in effect for one canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub pixels_per_inch: f64,
    pub canvas_scale: f64,
}

impl Projection {
    pub fn new(analysis: &WallAnalysis, canvas_scale: f64) -> Self {
        Self {
            pixels_per_inch: pixels_per_inch(analysis),
            canvas_scale,
        }
    }

    pub fn to_pixels(&self, inches: f64) -> f64 {
        to_pixels(inches, self.pixels_per_inch, self.canvas_scale)
    }

    pub fn to_inches(&self, pixels: f64) -> f64 {
        to_inches(pixels, self.pixels_per_inch, self.canvas_scale)
    }

    pub fn source_to_canvas(&self, source_pixels: f64) -> f64 {
        source_pixels * self.canvas_scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::tests::service_analysis;
    use crate::analysis::{AnalysisStatus, WallBounds};

    fn analysis_with_wall(height_px: f64, ceiling: f64) -> WallAnalysis {
        let mut a = service_analysis("a", AnalysisStatus::Completed);
        a.wall_bounds = Some(WallBounds {
            top: 100.0,
            bottom: 100.0 + height_px,
            left: 0.0,
            right: 1000.0,
        });
        a.ceiling_height_feet = ceiling;
        a
    }

    #[test]
    fn test_service_scale_wins() {
        let mut a = analysis_with_wall(400.0, 8.0);
        a.pixels_per_inch = Some(6.5);
        assert_eq!(pixels_per_inch(&a), 6.5);
    }

    #[test]
    fn test_derived_scale_follows_ceiling_height() {
        let a = analysis_with_wall(400.0, 8.0);
        assert!((pixels_per_inch(&a) - 4.1667).abs() < 1e-3);

        let a = analysis_with_wall(400.0, 10.0);
        assert!((pixels_per_inch(&a) - 3.3333).abs() < 1e-3);
    }

    #[test]
    fn test_default_scale_without_bounds() {
        let a = service_analysis("a", AnalysisStatus::Completed);
        assert_eq!(pixels_per_inch(&a), DEFAULT_PIXELS_PER_INCH);
    }

    #[test]
    fn test_to_pixels_is_linear() {
        for inches in [0.5, 3.0, 24.0, 61.25] {
            let one = to_pixels(inches, 4.2, 0.6);
            let two = to_pixels(2.0 * inches, 4.2, 0.6);
            assert!((two - 2.0 * one).abs() < 1e-9);
        }
    }

    #[test]
    fn test_pixel_round_trip() {
        let projection = Projection {
            pixels_per_inch: 3.3333,
            canvas_scale: 0.75,
        };
        for p in [0.0, 1.0, 137.5, 812.25, -40.0] {
            let back = projection.to_pixels(projection.to_inches(p));
            assert!((back - p).abs() < 1e-9, "{} -> {}", p, back);
        }
    }

    #[test]
    fn test_canvas_scale_factor() {
        assert_eq!(canvas_scale_factor(1200, 2400), 0.5);
        assert_eq!(canvas_scale_factor(1200, 0), 1.0);
    }
}
