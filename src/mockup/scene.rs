// src/mockup/scene.rs
// The authoritative state of one mockup: a wall analysis and the prints placed on it.
use serde::{Deserialize, Serialize};
use std::fmt;

use super::units::pixels_per_inch;
use crate::analysis::{AnalysisOrigin, WallAnalysis, WallBounds};
use crate::errors::{MockupError, Result};
use crate::models::{ImageRef, Photo, PrintVariant};

/// Top-left corner of a print, in inches from the wall photo's origin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    /// Sentinel for "not placed yet, center it".
    pub const UNPLACED: Position = Position { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_unplaced(&self) -> bool {
        *self == Self::UNPLACED
    }

    /// A position the user chose. The exact origin is shifted by a negligible
    /// amount so it cannot read back as the unplaced sentinel.
    pub fn placed(x: f64, y: f64) -> Self {
        const ORIGIN_NUDGE_INCHES: f64 = 1e-9;
        let position = Self::new(x, y);
        if position.is_unplaced() {
            Self::new(ORIGIN_NUDGE_INCHES, 0.0)
        } else {
            position
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrintId(String);

impl PrintId {
    /// One entry per photo and size combination.
    pub fn for_selection(photo_id: u64, variant_id: u64) -> Self {
        Self(format!("{}-{}", photo_id, variant_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PrintId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for PrintId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the scene needs to know about a photograph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoRef {
    pub id: u64,
    pub title: String,
    pub image: ImageRef,
    pub aspect_ratio: f64,
}

impl From<&Photo> for PhotoRef {
    fn from(photo: &Photo) -> Self {
        Self {
            id: photo.id,
            title: photo.title.clone(),
            image: photo.image.clone(),
            aspect_ratio: photo.aspect_ratio(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlacedPrint {
    pub id: PrintId,
    pub photo: PhotoRef,
    pub variant: PrintVariant,
    pub position: Position,
}

impl PlacedPrint {
    /// Physical (width, height) on the wall. Catalog sizes are landscape-first,
    /// so portrait photos hang with the dimensions swapped.
    pub fn size_inches(&self) -> (f64, f64) {
        let (w, h) = (self.variant.width_inches, self.variant.height_inches);
        if self.photo.aspect_ratio < 1.0 {
            (w.min(h), w.max(h))
        } else {
            (w.max(h), w.min(h))
        }
    }
}

/// Serializable scene state, enough to replay a mockup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneConfig {
    pub prints: Vec<PrintConfig>,
    pub wall_height_feet: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wall: Option<WallConfig>,
}

/// The wall geometry a mockup was composed on. Local analyses are never
/// registered anywhere, so their id alone cannot be looked up later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WallConfig {
    pub analysis_origin: AnalysisOrigin,
    /// Hosted photo, if any. Uploads kept in memory have none.
    pub source_url: Option<String>,
    pub image_width: Option<u32>,
    pub image_height: Option<u32>,
    pub bounds: Option<WallBounds>,
    /// Source-image pixels per inch the prints were sized with.
    pub pixels_per_inch: f64,
}

impl From<&WallAnalysis> for WallConfig {
    fn from(analysis: &WallAnalysis) -> Self {
        Self {
            analysis_origin: analysis.origin,
            source_url: match &analysis.source_image {
                ImageRef::Url { url } => Some(url.clone()),
                ImageRef::Inline { .. } => None,
            },
            image_width: analysis.image_width,
            image_height: analysis.image_height,
            bounds: analysis.resolved_bounds(),
            pixels_per_inch: pixels_per_inch(analysis),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintConfig {
    pub print_id: PrintId,
    pub photo_id: u64,
    pub variant_id: u64,
    pub width_inches: f64,
    pub height_inches: f64,
    pub position: Position,
}

pub struct MockupScene {
    analysis: WallAnalysis,
    prints: Vec<PlacedPrint>,
}

impl MockupScene {
    pub fn new(analysis: WallAnalysis) -> Result<Self> {
        if !analysis.status.is_usable() {
            return Err(MockupError::NotReady(analysis.status));
        }
        Ok(Self {
            analysis,
            prints: Vec::new(),
        })
    }

    pub fn analysis(&self) -> &WallAnalysis {
        &self.analysis
    }

    pub fn ceiling_height_feet(&self) -> f64 {
        self.analysis.ceiling_height_feet
    }

    /// Swap in a newer reading of the same analysis (ceiling or bounds edits).
    /// Stored print positions and sizes are unit-independent and stay as they are.
    pub fn refresh_analysis(&mut self, analysis: WallAnalysis) -> Result<()> {
        if analysis.id != self.analysis.id {
            return Err(MockupError::Validation(format!(
                "scene is anchored to analysis {}, not {}",
                self.analysis.id, analysis.id
            )));
        }
        if !analysis.status.is_usable() {
            return Err(MockupError::NotReady(analysis.status));
        }
        self.analysis = analysis;
        Ok(())
    }

    pub fn prints(&self) -> &[PlacedPrint] {
        &self.prints
    }

    pub fn print(&self, id: &PrintId) -> Option<&PlacedPrint> {
        self.prints.iter().find(|p| &p.id == id)
    }

    pub fn contains(&self, id: &PrintId) -> bool {
        self.print(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.prints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prints.is_empty()
    }

    /// Adds on top of the stack. A combination already in the scene is left where it is.
    pub fn add_print(&mut self, photo: PhotoRef, variant: PrintVariant) -> Result<PrintId> {
        if !(variant.width_inches > 0.0 && variant.height_inches > 0.0) {
            return Err(MockupError::Validation(format!(
                "variant {} has no physical size",
                variant.id
            )));
        }
        if !(photo.aspect_ratio.is_finite() && photo.aspect_ratio > 0.0) {
            return Err(MockupError::Validation(format!(
                "photo {} has no aspect ratio",
                photo.id
            )));
        }

        let id = PrintId::for_selection(photo.id, variant.id);
        if self.contains(&id) {
            return Ok(id);
        }

        self.prints.push(PlacedPrint {
            id: id.clone(),
            photo,
            variant,
            position: Position::UNPLACED,
        });
        Ok(id)
    }

    /// No clamping: prints may hang outside the detected wall.
    pub fn move_print(&mut self, id: &PrintId, position: Position) -> Result<()> {
        if !(position.x.is_finite() && position.y.is_finite()) {
            return Err(MockupError::Validation("position must be finite".to_string()));
        }
        let print = self
            .prints
            .iter_mut()
            .find(|p| &p.id == id)
            .ok_or_else(|| MockupError::NotFound(format!("print {}", id)))?;
        print.position = position;
        Ok(())
    }

    /// Removing an unknown id is a no-op. Returns whether anything was removed.
    pub fn remove_print(&mut self, id: &PrintId) -> bool {
        let before = self.prints.len();
        self.prints.retain(|p| &p.id != id);
        before != self.prints.len()
    }

    /// Drops every print whose id is not in `active`, keeping stacking order.
    pub fn retain_active(&mut self, active: &[PrintId]) {
        self.prints.retain(|p| active.contains(&p.id));
    }

    pub fn config(&self) -> SceneConfig {
        SceneConfig {
            prints: self
                .prints
                .iter()
                .map(|p| {
                    let (width_inches, height_inches) = p.size_inches();
                    PrintConfig {
                        print_id: p.id.clone(),
                        photo_id: p.photo.id,
                        variant_id: p.variant.id,
                        width_inches,
                        height_inches,
                        position: p.position,
                    }
                })
                .collect(),
            wall_height_feet: self.ceiling_height_feet(),
            wall: Some(WallConfig::from(&self.analysis)),
        }
    }
}
