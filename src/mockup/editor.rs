// src/mockup/editor.rs
// The mockup editor: one session from wall photo to saved mockup.
use log::{info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::compositor::{CanvasSize, Compositor, PixelRect, RenderSurface, WallState};
use super::persistence::{MockupStore, SavedMockupRef, save_mockup};
use super::scene::{MockupScene, PhotoRef, Position, PrintId};
use super::units::pixels_per_inch;
use crate::analysis::{
    AnalysisPoller, AnalysisSnapshot, AnalysisStatus, WallAnalysis, WallBounds,
};
use crate::errors::{MockupError, Result};
use crate::models::{ImageRef, Photo, PrintVariant};
use crate::services::image_loader::ImageLoader;
use crate::services::image_processor::WallUpload;

pub type CloseCallback = Box<dyn FnOnce() + Send>;

/// Collaborators shared by every editor in the process.
#[derive(Clone)]
pub struct EditorServices {
    pub poller: AnalysisPoller,
    pub loader: Arc<dyn ImageLoader>,
    pub store: Arc<dyn MockupStore>,
}

pub struct LaunchOptions {
    /// Launched from a product page with this print already chosen.
    pub preselected: Option<(Photo, PrintVariant)>,
    pub on_close: Option<CloseCallback>,
    pub canvas_width: u32,
    pub export_multiplier: f64,
}

enum Phase {
    AwaitingWall,
    Analyzing(WallAnalysis),
    Failed(WallAnalysis),
    Editing {
        scene: MockupScene,
        compositor: Compositor,
    },
    Closed,
}

#[derive(Debug, Serialize)]
pub struct PrintView {
    pub id: PrintId,
    pub title: String,
    pub variant: PrintVariant,
    pub position: Position,
    pub rect: Option<PixelRect>,
}

#[derive(Debug, Serialize)]
pub struct EditorSnapshot {
    pub phase: &'static str,
    pub analysis: Option<WallAnalysis>,
    pub pixels_per_inch: Option<f64>,
    pub canvas: Option<CanvasSize>,
    pub wall: Option<WallState>,
    pub prints: Vec<PrintView>,
    pub omitted: BTreeMap<PrintId, String>,
    pub last_error: Option<String>,
}

pub struct MockupEditor {
    services: EditorServices,
    surface: Option<Box<dyn RenderSurface>>,
    phase: Phase,
    preselected: Option<(Photo, PrintVariant)>,
    on_close: Option<CloseCallback>,
    canvas_width: u32,
    export_multiplier: f64,
    last_error: Option<String>,
}

impl MockupEditor {
    pub fn launch(
        services: EditorServices,
        surface: Box<dyn RenderSurface>,
        options: LaunchOptions,
    ) -> Self {
        Self {
            services,
            surface: Some(surface),
            phase: Phase::AwaitingWall,
            preselected: options.preselected,
            on_close: options.on_close,
            canvas_width: options.canvas_width,
            export_multiplier: options.export_multiplier,
            last_error: None,
        }
    }

    pub fn analysis(&self) -> Option<&WallAnalysis> {
        match &self.phase {
            Phase::Analyzing(a) | Phase::Failed(a) => Some(a),
            Phase::Editing { scene, .. } => Some(scene.analysis()),
            Phase::AwaitingWall | Phase::Closed => None,
        }
    }

    /// The analysis id still waiting on detection, if any.
    pub fn pending_analysis_id(&self) -> Option<&str> {
        match &self.phase {
            Phase::Analyzing(a) => Some(&a.id),
            _ => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.phase, Phase::Closed)
    }

    pub fn scene(&self) -> Option<&MockupScene> {
        match &self.phase {
            Phase::Editing { scene, .. } => Some(scene),
            _ => None,
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(MockupError::Validation("mockup editor is closed".to_string()));
        }
        Ok(())
    }

    fn editing(&mut self) -> Result<(&mut MockupScene, &mut Compositor)> {
        match &mut self.phase {
            Phase::Editing { scene, compositor } => Ok((scene, compositor)),
            Phase::Analyzing(a) | Phase::Failed(a) => Err(MockupError::NotReady(a.status)),
            Phase::AwaitingWall => Err(MockupError::Validation(
                "no wall photo has been chosen".to_string(),
            )),
            Phase::Closed => Err(MockupError::Validation("mockup editor is closed".to_string())),
        }
    }

    /// Upload a wall photo for detection. Replaces any current wall and its prints.
    pub async fn submit_wall(&mut self, upload: WallUpload) -> Result<&WallAnalysis> {
        self.ensure_open()?;
        let analysis = self.services.poller.submit(upload).await?;
        self.last_error = None;
        self.enter(analysis).await?;
        self.analysis()
            .ok_or_else(|| MockupError::Validation("editor has no analysis".to_string()))
    }

    /// Skip detection: the whole photo is wall and the user supplies the ceiling height.
    pub async fn start_manual(
        &mut self,
        source: ImageRef,
        width: u32,
        height: u32,
        ceiling_height_feet: f64,
    ) -> Result<()> {
        self.ensure_open()?;
        let analysis = WallAnalysis::manual(source, width, height, ceiling_height_feet)?;
        self.last_error = None;
        self.enter(analysis).await
    }

    async fn enter(&mut self, analysis: WallAnalysis) -> Result<()> {
        let previous = std::mem::replace(&mut self.phase, Phase::AwaitingWall);
        if let Phase::Editing { compositor, .. } = previous {
            // Reuse the drawing surface; prints anchored to the old wall are dropped.
            self.surface = Some(compositor.into_surface());
        }

        match analysis.status {
            s if s.is_usable() => self.open_scene(analysis).await,
            AnalysisStatus::Failed => {
                let message = failure_message(&analysis);
                self.phase = Phase::Failed(analysis);
                self.last_error = Some(message.clone());
                Err(MockupError::AnalysisFailed(message))
            }
            _ => {
                self.phase = Phase::Analyzing(analysis);
                Ok(())
            }
        }
    }

    async fn open_scene(&mut self, analysis: WallAnalysis) -> Result<()> {
        let mut scene = MockupScene::new(analysis)?;
        let surface = self
            .surface
            .take()
            .ok_or_else(|| MockupError::Render("drawing surface is in use".to_string()))?;
        let mut compositor = Compositor::new(
            surface,
            self.services.loader.clone(),
            self.canvas_width,
            self.export_multiplier,
        );

        if let Some((photo, variant)) = self.preselected.take() {
            if let Err(e) = scene.add_print(PhotoRef::from(&photo), variant) {
                warn!("Preselected print could not be added: {}", e);
            }
        }

        compositor.sync(&scene).await;
        info!(
            "Editing mockup on analysis {} ({})",
            scene.analysis().id,
            scene.analysis().status
        );
        self.phase = Phase::Editing { scene, compositor };
        Ok(())
    }

    /// Record an intermediate status reported while polling.
    pub fn record_progress(&mut self, status: AnalysisStatus) {
        if let Phase::Analyzing(analysis) = &mut self.phase {
            if !status.is_terminal() && analysis.status.can_transition_to(status) {
                analysis.status = status;
            }
        }
    }

    /// Apply the terminal snapshot returned by polling.
    pub async fn resolve_analysis(&mut self, snapshot: AnalysisSnapshot) -> Result<()> {
        let mut analysis = match &self.phase {
            Phase::Analyzing(a) => a.clone(),
            _ => {
                return Err(MockupError::Validation(
                    "no analysis is waiting on detection".to_string(),
                ));
            }
        };
        analysis.absorb(snapshot)?;
        self.enter(analysis).await
    }

    /// Polling gave up or failed hard; the analysis stays where it was.
    pub fn record_poll_failure(&mut self, error: &MockupError) {
        warn!("Wall analysis polling stopped: {}", error);
        self.last_error = Some(error.to_string());
    }

    /// Poll in place until the wall analysis settles.
    pub async fn await_analysis(&mut self) -> Result<()> {
        let id = self
            .pending_analysis_id()
            .map(str::to_string)
            .ok_or_else(|| MockupError::Validation("no analysis is waiting on detection".to_string()))?;
        let poller = self.services.poller.clone();

        match poller.poll(&id, |_| {}).await {
            Ok(snapshot) => self.resolve_analysis(snapshot).await,
            Err(e) => {
                self.record_poll_failure(&e);
                Err(e)
            }
        }
    }

    pub async fn update_ceiling_height(&mut self, feet: f64) -> Result<()> {
        self.ensure_open()?;
        let poller = self.services.poller.clone();

        let unsettled = match &self.phase {
            Phase::Analyzing(a) => Some(a.clone()),
            _ => None,
        };
        if let Some(mut analysis) = unsettled {
            poller.update_ceiling_height(&mut analysis, feet).await?;
            if analysis.status.is_terminal() {
                return self.enter(analysis).await;
            }
            self.phase = Phase::Analyzing(analysis);
            return Ok(());
        }

        let (scene, compositor) = self.editing()?;
        let mut analysis = scene.analysis().clone();
        poller.update_ceiling_height(&mut analysis, feet).await?;
        scene.refresh_analysis(analysis)?;
        compositor.sync(scene).await;
        Ok(())
    }

    /// User-drawn wall region; switches the analysis to manual.
    pub async fn set_wall_bounds(&mut self, bounds: WallBounds) -> Result<()> {
        self.ensure_open()?;
        let poller = self.services.poller.clone();

        let unsettled = match &self.phase {
            Phase::Analyzing(a) | Phase::Failed(a) => Some(a.clone()),
            _ => None,
        };
        if let Some(mut analysis) = unsettled {
            poller.set_manual_bounds(&mut analysis, bounds).await?;
            self.last_error = None;
            return self.enter(analysis).await;
        }

        let (scene, compositor) = self.editing()?;
        let mut analysis = scene.analysis().clone();
        poller.set_manual_bounds(&mut analysis, bounds).await?;
        scene.refresh_analysis(analysis)?;
        compositor.sync(scene).await;
        Ok(())
    }

    pub async fn add_print(&mut self, photo: PhotoRef, variant: PrintVariant) -> Result<PrintId> {
        let (scene, compositor) = self.editing()?;
        let id = scene.add_print(photo, variant)?;
        compositor.sync(scene).await;
        Ok(id)
    }

    pub async fn remove_print(&mut self, id: &PrintId) -> Result<()> {
        let (scene, compositor) = self.editing()?;
        if scene.remove_print(id) {
            compositor.sync(scene).await;
        }
        Ok(())
    }

    pub async fn retain_prints(&mut self, active: &[PrintId]) -> Result<()> {
        let (scene, compositor) = self.editing()?;
        scene.retain_active(active);
        compositor.sync(scene).await;
        Ok(())
    }

    pub fn commit_gesture(&mut self, id: &PrintId, rect: PixelRect) -> Result<Position> {
        let (scene, compositor) = self.editing()?;
        compositor.commit_gesture(scene, id, rect)
    }

    /// Redraw, retrying anything that failed to load.
    pub async fn refresh(&mut self) -> Result<()> {
        let (scene, compositor) = self.editing()?;
        compositor.sync(scene).await;
        Ok(())
    }

    pub fn export_image(&mut self) -> Result<Vec<u8>> {
        let (_, compositor) = self.editing()?;
        compositor.export_image()
    }

    /// The scene is kept on failure so the user can retry.
    pub async fn save(&mut self) -> Result<SavedMockupRef> {
        let store = self.services.store.clone();
        let (scene, compositor) = self.editing()?;
        compositor.sync(scene).await;
        save_mockup(store.as_ref(), scene, compositor).await
    }

    /// Idempotent. Runs the close callback the first time.
    pub fn close(&mut self) {
        if self.is_closed() {
            return;
        }
        self.phase = Phase::Closed;
        if let Some(on_close) = self.on_close.take() {
            on_close();
        }
    }

    pub fn snapshot(&self) -> EditorSnapshot {
        let (phase, analysis) = match &self.phase {
            Phase::AwaitingWall => ("awaiting_wall", None),
            Phase::Analyzing(a) => ("analyzing", Some(a)),
            Phase::Failed(a) => ("failed", Some(a)),
            Phase::Editing { scene, .. } => ("editing", Some(scene.analysis())),
            Phase::Closed => ("closed", None),
        };

        let mut snapshot = EditorSnapshot {
            phase,
            analysis: analysis.cloned(),
            pixels_per_inch: analysis.map(pixels_per_inch),
            canvas: None,
            wall: None,
            prints: Vec::new(),
            omitted: BTreeMap::new(),
            last_error: self.last_error.clone(),
        };

        if let Phase::Editing { scene, compositor } = &self.phase {
            snapshot.canvas = compositor.canvas();
            snapshot.wall = Some(compositor.wall_state().clone());
            snapshot.omitted = compositor.omitted().clone();
            snapshot.prints = scene
                .prints()
                .iter()
                .map(|p| PrintView {
                    id: p.id.clone(),
                    title: p.photo.title.clone(),
                    variant: p.variant.clone(),
                    position: p.position,
                    rect: compositor.rendered_rect(&p.id),
                })
                .collect();
        }

        snapshot
    }
}

impl Drop for MockupEditor {
    fn drop(&mut self) {
        self.close();
    }
}

fn failure_message(analysis: &WallAnalysis) -> String {
    analysis
        .error_message
        .clone()
        .unwrap_or_else(|| "Wall detection failed. Upload again or place the wall manually.".to_string())
}
