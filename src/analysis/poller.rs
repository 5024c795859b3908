// src/analysis/poller.rs
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;

use super::{
    AnalysisOrigin, AnalysisSnapshot, AnalysisStatus, DetectionService, WallAnalysis, WallBounds,
    validate_ceiling_height,
};
use crate::errors::{MockupError, Result};
use crate::models::ImageRef;
use crate::services::image_processor::WallUpload;

#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            max_attempts: 30,
        }
    }
}

/// Drives an analysis from submission to a terminal state.
#[derive(Clone)]
pub struct AnalysisPoller {
    service: Arc<dyn DetectionService>,
    config: PollConfig,
}

impl AnalysisPoller {
    pub fn new(service: Arc<dyn DetectionService>, config: PollConfig) -> Self {
        Self { service, config }
    }

    pub fn config(&self) -> PollConfig {
        self.config
    }

    pub async fn submit(&self, upload: WallUpload) -> Result<WallAnalysis> {
        let snapshot = self.service.submit(&upload).await?;
        info!(
            "Submitted wall photo {} as analysis {} ({})",
            upload.filename, snapshot.id, snapshot.status
        );
        let uploaded = ImageRef::inline(upload.content_type, upload.data);
        Ok(WallAnalysis::from_snapshot(snapshot, uploaded))
    }

    /// Fetches status once per interval, one request in flight, until the
    /// analysis is terminal. Fetch errors count against the attempt bound.
    pub async fn poll<F>(&self, id: &str, mut on_progress: F) -> Result<AnalysisSnapshot>
    where
        F: FnMut(AnalysisStatus) + Send,
    {
        for attempt in 1..=self.config.max_attempts {
            tokio::time::sleep(self.config.interval).await;

            match self.service.fetch(id).await {
                Ok(snapshot) => {
                    on_progress(snapshot.status);
                    if snapshot.status.is_terminal() {
                        info!(
                            "Analysis {} reached {} after {} attempts",
                            id, snapshot.status, attempt
                        );
                        return Ok(snapshot);
                    }
                }
                Err(e) if e.is_transient() => {
                    warn!("Poll attempt {} for analysis {} failed: {}", attempt, id, e);
                }
                Err(e) => return Err(e),
            }
        }

        warn!(
            "Analysis {} still not terminal after {} attempts",
            id, self.config.max_attempts
        );
        Err(MockupError::Timeout {
            attempts: self.config.max_attempts,
        })
    }

    pub async fn update_ceiling_height(&self, analysis: &mut WallAnalysis, feet: f64) -> Result<()> {
        validate_ceiling_height(feet)?;
        match analysis.origin {
            AnalysisOrigin::Local => {
                analysis.ceiling_height_feet = feet;
                Ok(())
            }
            AnalysisOrigin::Service => {
                let snapshot = self.service.update_ceiling_height(&analysis.id, feet).await?;
                analysis.absorb(snapshot)
            }
        }
    }

    pub async fn set_manual_bounds(
        &self,
        analysis: &mut WallAnalysis,
        bounds: WallBounds,
    ) -> Result<()> {
        analysis.check_bounds(&bounds)?;
        match analysis.origin {
            AnalysisOrigin::Local => analysis.set_manual_bounds(bounds),
            AnalysisOrigin::Service => {
                let snapshot = self.service.update_bounds(&analysis.id, bounds).await?;
                analysis.absorb(snapshot)
            }
        }
    }
}
