// src/mockup/compositor.rs
// Projects a MockupScene onto a drawing surface. The surface never owns authoritative
// state. The only way pixel-space interaction reaches the scene is
// Compositor::commit_gesture.
use image::{DynamicImage, GenericImageView};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::scene::{MockupScene, PlacedPrint, Position, PrintId};
use super::units::{Projection, canvas_scale_factor};
use crate::analysis::WallAnalysis;
use crate::errors::{MockupError, Result};
use crate::services::image_loader::ImageLoader;

pub const DEFAULT_EXPORT_MULTIPLIER: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PixelRect {
    fn approx_eq(&self, other: &PixelRect) -> bool {
        const EPS: f64 = 1e-6;
        (self.x - other.x).abs() < EPS
            && (self.y - other.y).abs() < EPS
            && (self.width - other.width).abs() < EPS
            && (self.height - other.height).abs() < EPS
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

/// The drawing capability: place images at rectangles and flatten the result.
/// Drag and resize handles live on the surface side; commits come back through
/// the compositor.
pub trait RenderSurface: Send {
    /// `None` draws a placeholder in place of the wall photo.
    fn set_background(&mut self, image: Option<Arc<DynamicImage>>, size: CanvasSize);

    /// Adds the item on top, or moves an existing item without restacking it.
    fn place(&mut self, id: &PrintId, image: Arc<DynamicImage>, rect: PixelRect);

    fn set_rect(&mut self, id: &PrintId, rect: PixelRect);

    fn remove(&mut self, id: &PrintId);

    /// Bottom to top.
    fn restack(&mut self, order: &[PrintId]);

    /// Encoded image of the background and every item at `multiplier` times canvas size.
    fn rasterize(&self, multiplier: f64) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum WallState {
    NotLoaded,
    Loaded,
    Placeholder(String),
}

pub struct Compositor {
    surface: Box<dyn RenderSurface>,
    loader: Arc<dyn ImageLoader>,
    canvas_width: u32,
    export_multiplier: f64,
    canvas: Option<CanvasSize>,
    source_width: u32,
    projection: Option<Projection>,
    wall: WallState,
    rendered: HashMap<PrintId, PixelRect>,
    omitted: BTreeMap<PrintId, String>,
}

impl Compositor {
    pub fn new(
        surface: Box<dyn RenderSurface>,
        loader: Arc<dyn ImageLoader>,
        canvas_width: u32,
        export_multiplier: f64,
    ) -> Self {
        Self {
            surface,
            loader,
            canvas_width: canvas_width.max(1),
            export_multiplier,
            canvas: None,
            source_width: 0,
            projection: None,
            wall: WallState::NotLoaded,
            rendered: HashMap::new(),
            omitted: BTreeMap::new(),
        }
    }

    pub fn canvas(&self) -> Option<CanvasSize> {
        self.canvas
    }

    pub fn projection(&self) -> Option<Projection> {
        self.projection
    }

    pub fn wall_state(&self) -> &WallState {
        &self.wall
    }

    /// Prints in the scene that could not be drawn, with the reason.
    pub fn omitted(&self) -> &BTreeMap<PrintId, String> {
        &self.omitted
    }

    pub fn rendered_rect(&self, id: &PrintId) -> Option<PixelRect> {
        self.rendered.get(id).copied()
    }

    /// Hands the surface back with every print removed.
    pub fn into_surface(mut self) -> Box<dyn RenderSurface> {
        for id in self.rendered.keys() {
            self.surface.remove(id);
        }
        self.surface.restack(&[]);
        self.surface
    }

    async fn load_wall(&mut self, analysis: &WallAnalysis) {
        let loaded = self.loader.load(&analysis.source_image).await;

        let (image, source_size) = match loaded {
            Ok(img) => {
                let (w, h) = img.dimensions();
                let width = analysis.image_width.unwrap_or(w);
                let height = analysis.image_height.unwrap_or(h);
                self.wall = WallState::Loaded;
                (Some(Arc::new(img)), Some((width, height)))
            }
            Err(e) => {
                warn!(
                    "Wall photo {} failed to load: {}",
                    analysis.source_image.describe(),
                    e
                );
                self.wall = WallState::Placeholder(e.to_string());
                let dims = analysis.image_width.zip(analysis.image_height);
                (None, dims)
            }
        };

        let canvas = match source_size {
            Some((w, h)) if w > 0 && h > 0 => {
                let scale = canvas_scale_factor(self.canvas_width, w);
                self.source_width = w;
                CanvasSize {
                    width: self.canvas_width,
                    height: ((h as f64 * scale).round() as u32).max(1),
                }
            }
            _ => {
                self.source_width = self.canvas_width;
                CanvasSize {
                    width: self.canvas_width,
                    height: (self.canvas_width * 3 / 4).max(1),
                }
            }
        };

        self.canvas = Some(canvas);
        self.surface.set_background(image, canvas);
    }

    fn rect_for(
        &self,
        print: &PlacedPrint,
        analysis: &WallAnalysis,
        projection: &Projection,
        canvas: CanvasSize,
    ) -> PixelRect {
        let (w_in, h_in) = print.size_inches();
        let width = projection.to_pixels(w_in);
        let height = projection.to_pixels(h_in);

        let (x, y) = if print.position.is_unplaced() {
            let (cx, cy) = analysis
                .resolved_bounds()
                .map(|b| {
                    let (cx, cy) = b.center();
                    (projection.source_to_canvas(cx), projection.source_to_canvas(cy))
                })
                .unwrap_or((canvas.width as f64 / 2.0, canvas.height as f64 / 2.0));
            (cx - width / 2.0, cy - height / 2.0)
        } else {
            (
                projection.to_pixels(print.position.x),
                projection.to_pixels(print.position.y),
            )
        };

        PixelRect { x, y, width, height }
    }

    /// Reconcile the surface with the scene. Safe to call repeatedly.
    pub async fn sync(&mut self, scene: &MockupScene) {
        let analysis = scene.analysis();
        if self.wall != WallState::Loaded {
            self.load_wall(analysis).await;
        }
        let canvas = match self.canvas {
            Some(c) => c,
            None => return,
        };

        let projection = Projection::new(
            analysis,
            canvas_scale_factor(canvas.width, self.source_width),
        );
        self.projection = Some(projection);

        let stale: Vec<PrintId> = self
            .rendered
            .keys()
            .filter(|id| !scene.contains(id))
            .cloned()
            .collect();
        for id in stale {
            debug!("Removing print {} from surface", id);
            self.surface.remove(&id);
            self.rendered.remove(&id);
        }
        self.omitted.retain(|id, _| scene.contains(id));

        for print in scene.prints() {
            let rect = self.rect_for(print, analysis, &projection, canvas);

            match self.rendered.get(&print.id).copied() {
                Some(current) if current.approx_eq(&rect) => {}
                Some(_) => {
                    self.surface.set_rect(&print.id, rect);
                    self.rendered.insert(print.id.clone(), rect);
                }
                None => match self.loader.load(&print.photo.image).await {
                    Ok(img) => {
                        self.surface.place(&print.id, Arc::new(img), rect);
                        self.rendered.insert(print.id.clone(), rect);
                        self.omitted.remove(&print.id);
                    }
                    Err(e) => {
                        warn!("Print {} omitted from surface: {}", print.id, e);
                        self.omitted.insert(print.id.clone(), e.to_string());
                    }
                },
            }
        }

        let order: Vec<PrintId> = scene
            .prints()
            .iter()
            .filter(|p| self.rendered.contains_key(&p.id))
            .map(|p| p.id.clone())
            .collect();
        self.surface.restack(&order);
    }

    /// A drag or resize finished on the surface. Only the new top-left corner is
    /// kept; the print's size always comes from its variant.
    pub fn commit_gesture(
        &mut self,
        scene: &mut MockupScene,
        id: &PrintId,
        rect: PixelRect,
    ) -> Result<Position> {
        if !self.rendered.contains_key(id) {
            return Err(MockupError::NotFound(format!("print {} is not on the canvas", id)));
        }
        let (projection, canvas) = match (self.projection, self.canvas) {
            (Some(p), Some(c)) => (p, c),
            _ => return Err(MockupError::Render("canvas has not been drawn".to_string())),
        };
        if !(rect.x.is_finite() && rect.y.is_finite()) {
            return Err(MockupError::Validation("gesture position must be finite".to_string()));
        }

        let position = Position::placed(projection.to_inches(rect.x), projection.to_inches(rect.y));
        scene.move_print(id, position)?;

        if let Some(print) = scene.print(id) {
            let settled = self.rect_for(print, scene.analysis(), &projection, canvas);
            self.surface.set_rect(id, settled);
            self.rendered.insert(id.clone(), settled);
        }
        Ok(position)
    }

    pub fn export_image(&self) -> Result<Vec<u8>> {
        if self.canvas.is_none() {
            return Err(MockupError::Render("canvas has not been drawn".to_string()));
        }
        self.surface.rasterize(self.export_multiplier)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::analysis::tests::service_analysis;
    use crate::analysis::{AnalysisStatus, WallBounds};
    use crate::mockup::scene::tests::{photo_ref, variant};
    use crate::models::ImageRef;
    use async_trait::async_trait;
    use image::RgbaImage;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Call {
        Background(bool, CanvasSize),
        Place(String, PixelRect),
        SetRect(String, PixelRect),
        Remove(String),
        Restack(Vec<String>),
    }

    /// Records every call; the log is shared so tests can read it after boxing.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingSurface {
        pub calls: Arc<Mutex<Vec<Call>>>,
    }

    impl RecordingSurface {
        pub(crate) fn take(&self) -> Vec<Call> {
            std::mem::take(&mut *self.calls.lock().unwrap())
        }
    }

    impl RenderSurface for RecordingSurface {
        fn set_background(&mut self, image: Option<Arc<DynamicImage>>, size: CanvasSize) {
            self.calls.lock().unwrap().push(Call::Background(image.is_some(), size));
        }

        fn place(&mut self, id: &PrintId, _image: Arc<DynamicImage>, rect: PixelRect) {
            self.calls.lock().unwrap().push(Call::Place(id.to_string(), rect));
        }

        fn set_rect(&mut self, id: &PrintId, rect: PixelRect) {
            self.calls.lock().unwrap().push(Call::SetRect(id.to_string(), rect));
        }

        fn remove(&mut self, id: &PrintId) {
            self.calls.lock().unwrap().push(Call::Remove(id.to_string()));
        }

        fn restack(&mut self, order: &[PrintId]) {
            let order = order.iter().map(|id| id.to_string()).collect();
            self.calls.lock().unwrap().push(Call::Restack(order));
        }

        fn rasterize(&self, multiplier: f64) -> Result<Vec<u8>> {
            Ok(format!("raster@{}", multiplier).into_bytes())
        }
    }

    /// Serves a small blank image for every URL except those listed as broken.
    #[derive(Default)]
    pub(crate) struct FakeLoader {
        pub broken: Mutex<Vec<String>>,
        pub loads: AtomicU32,
    }

    impl FakeLoader {
        pub(crate) fn breaking(urls: &[&str]) -> Self {
            Self {
                broken: Mutex::new(urls.iter().map(|u| u.to_string()).collect()),
                loads: AtomicU32::new(0),
            }
        }

        pub(crate) fn fix(&self, url: &str) {
            self.broken.lock().unwrap().retain(|u| u != url);
        }
    }

    #[async_trait]
    impl ImageLoader for FakeLoader {
        async fn load(&self, image: &ImageRef) -> Result<DynamicImage> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            let key = image.describe();
            if self.broken.lock().unwrap().contains(&key) {
                return Err(MockupError::ImageProcessing(format!("404 for {}", key)));
            }
            Ok(DynamicImage::ImageRgba8(RgbaImage::new(6, 4)))
        }
    }

    const WALL_URL: &str = "https://media.test/walls/living.jpg";

    /// 1200x800 wall photo, wall spans 400px of height, 8ft ceiling.
    fn wall_scene() -> MockupScene {
        let mut analysis = service_analysis("wall-1", AnalysisStatus::Completed);
        analysis.wall_bounds = Some(WallBounds {
            top: 200.0,
            bottom: 600.0,
            left: 100.0,
            right: 1100.0,
        });
        MockupScene::new(analysis).unwrap()
    }

    fn compositor(surface: &RecordingSurface, loader: Arc<FakeLoader>) -> Compositor {
        Compositor::new(Box::new(surface.clone()), loader, 600, DEFAULT_EXPORT_MULTIPLIER)
    }

    fn assert_rect(actual: PixelRect, x: f64, y: f64, w: f64, h: f64) {
        let expected = PixelRect { x, y, width: w, height: h };
        assert!(actual.approx_eq(&expected), "{:?} != {:?}", actual, expected);
    }

    #[tokio::test]
    async fn test_sync_places_new_print_centered_on_wall() {
        let surface = RecordingSurface::default();
        let mut comp = compositor(&surface, Arc::new(FakeLoader::default()));
        let mut scene = wall_scene();
        let id = scene.add_print(photo_ref(1, 1.5), variant(10, 24.0, 16.0)).unwrap();

        comp.sync(&scene).await;

        // ppi = 400 / 96; canvas scale = 0.5; 24in -> 50px, 16in -> 33.33px.
        // Wall center (600, 400) source -> (300, 200) canvas.
        let rect = comp.rendered_rect(&id).unwrap();
        assert_rect(rect, 275.0, 200.0 - 100.0 / 6.0, 50.0, 100.0 / 3.0);
        assert_eq!(comp.canvas(), Some(CanvasSize { width: 600, height: 400 }));
        assert_eq!(comp.wall_state(), &WallState::Loaded);

        let calls = surface.take();
        assert_eq!(calls[0], Call::Background(true, CanvasSize { width: 600, height: 400 }));
        assert!(matches!(&calls[1], Call::Place(p, _) if p == "1-10"));
        assert_eq!(calls[2], Call::Restack(vec!["1-10".to_string()]));
    }

    #[tokio::test]
    async fn test_sync_is_idempotent() {
        let surface = RecordingSurface::default();
        let loader = Arc::new(FakeLoader::default());
        let mut comp = compositor(&surface, loader.clone());
        let mut scene = wall_scene();
        scene.add_print(photo_ref(1, 1.5), variant(10, 24.0, 16.0)).unwrap();
        scene.add_print(photo_ref(2, 1.5), variant(10, 24.0, 16.0)).unwrap();

        comp.sync(&scene).await;
        surface.take();
        let loads = loader.loads.load(Ordering::SeqCst);

        comp.sync(&scene).await;
        comp.sync(&scene).await;

        assert_eq!(loader.loads.load(Ordering::SeqCst), loads);
        let calls = surface.take();
        assert!(calls.iter().all(|c| matches!(c, Call::Restack(_))));
    }

    #[tokio::test]
    async fn test_sync_removes_dropped_prints() {
        let surface = RecordingSurface::default();
        let mut comp = compositor(&surface, Arc::new(FakeLoader::default()));
        let mut scene = wall_scene();
        let a = scene.add_print(photo_ref(1, 1.5), variant(10, 24.0, 16.0)).unwrap();
        scene.add_print(photo_ref(2, 1.5), variant(10, 24.0, 16.0)).unwrap();
        comp.sync(&scene).await;
        surface.take();

        scene.remove_print(&a);
        comp.sync(&scene).await;

        let calls = surface.take();
        assert!(calls.contains(&Call::Remove("1-10".to_string())));
        assert!(comp.rendered_rect(&a).is_none());
    }

    #[tokio::test]
    async fn test_commit_gesture_writes_inches_back() {
        let surface = RecordingSurface::default();
        let mut comp = compositor(&surface, Arc::new(FakeLoader::default()));
        let mut scene = wall_scene();
        let id = scene.add_print(photo_ref(1, 1.5), variant(10, 24.0, 16.0)).unwrap();
        comp.sync(&scene).await;

        // User also stretched it; only the corner survives.
        let dropped = PixelRect { x: 120.0, y: 80.0, width: 90.0, height: 70.0 };
        let position = comp.commit_gesture(&mut scene, &id, dropped).unwrap();

        let projection = comp.projection().unwrap();
        assert!((projection.to_pixels(position.x) - 120.0).abs() < 1e-9);
        assert!((projection.to_pixels(position.y) - 80.0).abs() < 1e-9);
        assert_eq!(scene.print(&id).unwrap().position, position);
        assert_rect(comp.rendered_rect(&id).unwrap(), 120.0, 80.0, 50.0, 100.0 / 3.0);

        surface.take();
        comp.sync(&scene).await;
        assert!(surface.take().iter().all(|c| matches!(c, Call::Restack(_))));
    }

    #[tokio::test]
    async fn test_commit_gesture_at_origin_stays_put() {
        let surface = RecordingSurface::default();
        let mut comp = compositor(&surface, Arc::new(FakeLoader::default()));
        let mut scene = wall_scene();
        let id = scene.add_print(photo_ref(1, 1.5), variant(10, 24.0, 16.0)).unwrap();
        comp.sync(&scene).await;

        let corner = PixelRect { x: 0.0, y: 0.0, width: 50.0, height: 100.0 / 3.0 };
        let position = comp.commit_gesture(&mut scene, &id, corner).unwrap();
        assert!(!position.is_unplaced());

        comp.sync(&scene).await;
        assert_rect(comp.rendered_rect(&id).unwrap(), 0.0, 0.0, 50.0, 100.0 / 3.0);
    }

    #[tokio::test]
    async fn test_commit_gesture_unknown_print() {
        let surface = RecordingSurface::default();
        let mut comp = compositor(&surface, Arc::new(FakeLoader::default()));
        let mut scene = wall_scene();
        comp.sync(&scene).await;

        let rect = PixelRect { x: 1.0, y: 1.0, width: 1.0, height: 1.0 };
        let err = comp.commit_gesture(&mut scene, &PrintId::from("7-7"), rect).unwrap_err();
        assert!(matches!(err, MockupError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_ceiling_change_shrinks_prints_not_inches() {
        let surface = RecordingSurface::default();
        let mut comp = compositor(&surface, Arc::new(FakeLoader::default()));
        let mut scene = wall_scene();
        let id = scene.add_print(photo_ref(1, 1.5), variant(10, 24.0, 16.0)).unwrap();
        scene.move_print(&id, Position::new(48.0, 24.0)).unwrap();
        comp.sync(&scene).await;
        let before = comp.rendered_rect(&id).unwrap();

        let mut analysis = scene.analysis().clone();
        analysis.ceiling_height_feet = 10.0;
        scene.refresh_analysis(analysis).unwrap();
        surface.take();
        comp.sync(&scene).await;

        let after = comp.rendered_rect(&id).unwrap();
        assert!((after.width / before.width - 0.8).abs() < 1e-9);
        assert!((after.x / before.x - 0.8).abs() < 1e-9);
        assert_eq!(scene.print(&id).unwrap().position, Position::new(48.0, 24.0));
        assert!(matches!(&surface.take()[0], Call::SetRect(p, _) if p == "1-10"));
    }

    #[tokio::test]
    async fn test_broken_print_image_is_omitted_then_retried() {
        let surface = RecordingSurface::default();
        let loader = Arc::new(FakeLoader::breaking(&["https://cdn.test/photos/1.jpg"]));
        let mut comp = compositor(&surface, loader.clone());
        let mut scene = wall_scene();
        let a = scene.add_print(photo_ref(1, 1.5), variant(10, 24.0, 16.0)).unwrap();
        let b = scene.add_print(photo_ref(2, 1.5), variant(10, 24.0, 16.0)).unwrap();

        comp.sync(&scene).await;
        assert!(comp.rendered_rect(&a).is_none());
        assert!(comp.rendered_rect(&b).is_some());
        assert!(comp.omitted().contains_key(&a));
        assert_eq!(scene.len(), 2);

        loader.fix("https://cdn.test/photos/1.jpg");
        surface.take();
        comp.sync(&scene).await;

        assert!(comp.omitted().is_empty());
        let calls = surface.take();
        assert_eq!(
            calls.last(),
            Some(&Call::Restack(vec!["1-10".to_string(), "2-10".to_string()]))
        );
    }

    #[tokio::test]
    async fn test_broken_wall_image_gives_placeholder() {
        let surface = RecordingSurface::default();
        let mut comp = compositor(&surface, Arc::new(FakeLoader::breaking(&[WALL_URL])));
        let mut scene = wall_scene();
        let id = scene.add_print(photo_ref(1, 1.5), variant(10, 24.0, 16.0)).unwrap();

        comp.sync(&scene).await;

        assert!(matches!(comp.wall_state(), WallState::Placeholder(_)));
        assert!(comp.rendered_rect(&id).is_some());
        assert_eq!(
            surface.take()[0],
            Call::Background(false, CanvasSize { width: 600, height: 400 })
        );
        assert_eq!(comp.export_image().unwrap(), b"raster@2".to_vec());
    }

    #[tokio::test]
    async fn test_unplaced_print_centers_on_canvas_without_bounds() {
        let surface = RecordingSurface::default();
        let mut comp = compositor(&surface, Arc::new(FakeLoader::default()));
        let mut analysis = service_analysis("wall-1", AnalysisStatus::Completed);
        analysis.image_width = None;
        analysis.image_height = None;
        let mut scene = MockupScene::new(analysis).unwrap();
        let id = scene.add_print(photo_ref(1, 1.0), variant(10, 10.0, 10.0)).unwrap();

        comp.sync(&scene).await;

        // Loaded image is 6x4, so canvas is 600x400 at scale 100; default 10 ppi.
        let rect = comp.rendered_rect(&id).unwrap();
        assert_rect(rect, 300.0 - 5000.0, 200.0 - 5000.0, 10000.0, 10000.0);
    }

    #[test]
    fn test_export_before_draw_fails() {
        let surface = RecordingSurface::default();
        let comp = compositor(&surface, Arc::new(FakeLoader::default()));
        assert!(matches!(comp.export_image(), Err(MockupError::Render(_))));
    }
}
