// src/services/raster_surface.rs
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, ImageFormat, Rgba, RgbaImage};
use std::sync::Arc;

use crate::errors::MockupError;
use crate::mockup::compositor::{CanvasSize, PixelRect, RenderSurface};
use crate::mockup::scene::PrintId;

const PLACEHOLDER_GREY: Rgba<u8> = Rgba([214, 211, 206, 255]);
/// Largest export, in pixels.
const MAX_OUTPUT_PIXELS: f64 = 40_000_000.0;
/// An item may span at most this many canvas widths or heights.
const MAX_ITEM_SPAN: f64 = 8.0;

struct Item {
    id: PrintId,
    image: Arc<DynamicImage>,
    rect: PixelRect,
}

/// In-memory surface that flattens to PNG with the `image` crate.
pub struct RasterSurface {
    background: Option<Arc<DynamicImage>>,
    size: CanvasSize,
    items: Vec<Item>,
}

impl RasterSurface {
    pub fn new() -> Self {
        Self {
            background: None,
            size: CanvasSize {
                width: 1,
                height: 1,
            },
            items: Vec::new(),
        }
    }

    fn item_mut(&mut self, id: &PrintId) -> Option<&mut Item> {
        self.items.iter_mut().find(|item| &item.id == id)
    }
}

impl RenderSurface for RasterSurface {
    fn set_background(&mut self, image: Option<Arc<DynamicImage>>, size: CanvasSize) {
        self.background = image;
        self.size = size;
    }

    fn place(&mut self, id: &PrintId, image: Arc<DynamicImage>, rect: PixelRect) {
        match self.item_mut(id) {
            Some(item) => {
                item.image = image;
                item.rect = rect;
            }
            None => self.items.push(Item {
                id: id.clone(),
                image,
                rect,
            }),
        }
    }

    fn set_rect(&mut self, id: &PrintId, rect: PixelRect) {
        if let Some(item) = self.item_mut(id) {
            item.rect = rect;
        }
    }

    fn remove(&mut self, id: &PrintId) {
        self.items.retain(|item| &item.id != id);
    }

    fn restack(&mut self, order: &[PrintId]) {
        self.items.sort_by_key(|item| {
            order
                .iter()
                .position(|id| id == &item.id)
                .unwrap_or(usize::MAX)
        });
    }

    fn rasterize(&self, multiplier: f64) -> Result<Vec<u8>, MockupError> {
        if !(multiplier.is_finite() && multiplier > 0.0) {
            return Err(MockupError::Render(format!(
                "invalid export multiplier {}",
                multiplier
            )));
        }

        let width = (self.size.width as f64 * multiplier).round().max(1.0);
        let height = (self.size.height as f64 * multiplier).round().max(1.0);
        if width * height > MAX_OUTPUT_PIXELS {
            return Err(MockupError::Render(format!(
                "mockup of {}x{} px is too large to export",
                width, height
            )));
        }
        let (width, height) = (width as u32, height as u32);

        let mut canvas = match &self.background {
            Some(bg) => bg.resize_exact(width, height, FilterType::Triangle).to_rgba8(),
            None => RgbaImage::from_pixel(width, height, PLACEHOLDER_GREY),
        };

        for item in &self.items {
            if let Some((visible, x, y)) = visible_part(item, multiplier, width, height)? {
                imageops::overlay(&mut canvas, &visible, x, y);
            }
        }

        let mut output = Vec::new();
        DynamicImage::ImageRgba8(canvas)
            .write_to(&mut std::io::Cursor::new(&mut output), ImageFormat::Png)
            .map_err(|e| MockupError::Render(format!("Failed to encode mockup: {}", e)))?;

        Ok(output)
    }
}

/// Resamples only the part of an item that lands on the canvas, returning it
/// with its top-left offset. Items off the canvas or under a pixel give `None`.
fn visible_part(
    item: &Item,
    multiplier: f64,
    width: u32,
    height: u32,
) -> Result<Option<(RgbaImage, i64, i64)>, MockupError> {
    let x = item.rect.x * multiplier;
    let y = item.rect.y * multiplier;
    let w = item.rect.width * multiplier;
    let h = item.rect.height * multiplier;
    if ![x, y, w, h].iter().all(|v| v.is_finite()) {
        return Err(MockupError::Render(format!("print {} has no finite placement", item.id)));
    }
    if w > width as f64 * MAX_ITEM_SPAN || h > height as f64 * MAX_ITEM_SPAN {
        return Err(MockupError::Render(format!(
            "print {} is {:.0}x{:.0} px on a {}x{} canvas, check the wall scale",
            item.id, w, h, width, height
        )));
    }
    if w.round() < 1.0 || h.round() < 1.0 {
        return Ok(None);
    }

    let left = x.max(0.0).round();
    let top = y.max(0.0).round();
    let right = (x + w).min(width as f64).round();
    let bottom = (y + h).min(height as f64).round();
    if right <= left || bottom <= top {
        return Ok(None);
    }

    // Matching window in source pixels, at least one pixel wide.
    let (src_w, src_h) = item.image.dimensions();
    if src_w == 0 || src_h == 0 {
        return Ok(None);
    }
    let span = |from: f64, to: f64, origin: f64, extent: f64, src: u32| -> (u32, u32) {
        let src = src as f64;
        let start = ((from - origin) / extent * src).floor().clamp(0.0, src - 1.0);
        let end = ((to - origin) / extent * src).ceil().clamp(start + 1.0, src);
        (start as u32, (end - start) as u32)
    };
    let (sx, sw) = span(left, right, x, w, src_w);
    let (sy, sh) = span(top, bottom, y, h, src_h);

    let visible = item
        .image
        .crop_imm(sx, sy, sw, sh)
        .resize_exact((right - left) as u32, (bottom - top) as u32, FilterType::Lanczos3)
        .to_rgba8();
    Ok(Some((visible, left as i64, top as i64)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalysisStatus;
    use crate::analysis::tests::service_analysis;
    use crate::mockup::Compositor;
    use crate::mockup::compositor::tests::FakeLoader;
    use crate::mockup::scene::MockupScene;
    use crate::mockup::scene::tests::{photo_ref, variant};

    fn solid(color: [u8; 4]) -> Arc<DynamicImage> {
        Arc::new(DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba(color))))
    }

    fn rect(x: f64, y: f64, width: f64, height: f64) -> PixelRect {
        PixelRect { x, y, width, height }
    }

    fn decode(png: &[u8]) -> RgbaImage {
        image::load_from_memory(png).unwrap().to_rgba8()
    }

    #[test]
    fn test_placeholder_background_at_multiplier() {
        let mut surface = RasterSurface::new();
        surface.set_background(None, CanvasSize { width: 40, height: 30 });

        let out = decode(&surface.rasterize(2.0).unwrap());

        assert_eq!(out.dimensions(), (80, 60));
        assert_eq!(*out.get_pixel(5, 5), PLACEHOLDER_GREY);
    }

    #[test]
    fn test_later_items_draw_on_top() {
        let mut surface = RasterSurface::new();
        surface.set_background(Some(solid([255, 255, 255, 255])), CanvasSize { width: 20, height: 20 });
        let red = PrintId::from("1-1");
        let blue = PrintId::from("2-1");
        surface.place(&red, solid([255, 0, 0, 255]), rect(0.0, 0.0, 10.0, 10.0));
        surface.place(&blue, solid([0, 0, 255, 255]), rect(5.0, 5.0, 10.0, 10.0));

        let out = decode(&surface.rasterize(1.0).unwrap());
        assert_eq!(*out.get_pixel(2, 2), Rgba([255, 0, 0, 255]));
        assert_eq!(*out.get_pixel(7, 7), Rgba([0, 0, 255, 255]));
        assert_eq!(*out.get_pixel(18, 18), Rgba([255, 255, 255, 255]));

        surface.restack(&[blue.clone(), red.clone()]);
        let out = decode(&surface.rasterize(1.0).unwrap());
        assert_eq!(*out.get_pixel(7, 7), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_items_may_overhang_canvas() {
        let mut surface = RasterSurface::new();
        surface.set_background(None, CanvasSize { width: 10, height: 10 });
        surface.place(&PrintId::from("1-1"), solid([0, 0, 0, 255]), rect(-5.0, 6.0, 8.0, 8.0));

        let out = decode(&surface.rasterize(1.0).unwrap());
        assert_eq!(*out.get_pixel(1, 8), Rgba([0, 0, 0, 255]));
        assert_eq!(*out.get_pixel(1, 2), PLACEHOLDER_GREY);
    }

    #[test]
    fn test_removed_items_are_not_drawn() {
        let mut surface = RasterSurface::new();
        surface.set_background(None, CanvasSize { width: 10, height: 10 });
        let id = PrintId::from("1-1");
        surface.place(&id, solid([0, 0, 0, 255]), rect(0.0, 0.0, 10.0, 10.0));
        surface.remove(&id);

        let out = decode(&surface.rasterize(1.0).unwrap());
        assert_eq!(*out.get_pixel(5, 5), PLACEHOLDER_GREY);
    }

    #[test]
    fn test_only_visible_part_is_resampled() {
        let mut surface = RasterSurface::new();
        surface.set_background(None, CanvasSize { width: 10, height: 10 });
        surface.place(&PrintId::from("1-1"), solid([0, 0, 0, 255]), rect(-40.0, -40.0, 60.0, 60.0));

        let out = decode(&surface.rasterize(1.0).unwrap());
        assert_eq!(out.dimensions(), (10, 10));
        assert_eq!(*out.get_pixel(9, 9), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_oversized_item_is_a_render_error() {
        let mut surface = RasterSurface::new();
        surface.set_background(None, CanvasSize { width: 600, height: 400 });
        surface.place(
            &PrintId::from("1-1"),
            solid([0, 0, 0, 255]),
            rect(-300_000.0, -200_000.0, 1_200_000.0, 800_000.0),
        );

        assert!(matches!(surface.rasterize(2.0), Err(MockupError::Render(_))));
    }

    #[test]
    fn test_oversized_canvas_is_a_render_error() {
        let mut surface = RasterSurface::new();
        surface.set_background(None, CanvasSize { width: 100_000, height: 100_000 });
        assert!(matches!(surface.rasterize(1.0), Err(MockupError::Render(_))));
    }

    #[tokio::test]
    async fn test_runaway_wall_scale_fails_export_cleanly() {
        let mut analysis = service_analysis("wall-1", AnalysisStatus::Completed);
        analysis.pixels_per_inch = Some(100_000.0);
        let mut scene = MockupScene::new(analysis).unwrap();
        scene.add_print(photo_ref(1, 1.5), variant(1, 24.0, 16.0)).unwrap();

        let mut compositor = Compositor::new(
            Box::new(RasterSurface::new()),
            Arc::new(FakeLoader::default()),
            600,
            2.0,
        );
        compositor.sync(&scene).await;

        assert!(matches!(compositor.export_image(), Err(MockupError::Render(_))));
    }

    #[test]
    fn test_rejects_bad_multiplier() {
        let surface = RasterSurface::new();
        assert!(matches!(surface.rasterize(0.0), Err(MockupError::Render(_))));
    }
}
