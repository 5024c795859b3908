// src/mockup/persistence.rs
// Saving a flattened mockup together with the scene state that produced it.
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};

use super::compositor::Compositor;
use super::scene::{MockupScene, SceneConfig};
use crate::errors::{MockupError, Result};

#[derive(Debug, Clone)]
pub struct SaveRequest {
    pub analysis_id: String,
    /// Encoded PNG.
    pub raster_image: Vec<u8>,
    pub config: SceneConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedMockupRef {
    pub id: String,
    pub share_url: String,
}

#[derive(Debug, Clone)]
pub struct SavedMockup {
    pub id: String,
    pub analysis_id: String,
    pub raster_image: Vec<u8>,
    pub content_type: String,
    pub config: SceneConfig,
    pub share_url: String,
    pub created_at: DateTime<Utc>,
}

/// The storage collaborator. No local fallback: failures reach the caller.
#[async_trait]
pub trait MockupStore: Send + Sync {
    async fn save(&self, request: SaveRequest) -> Result<SavedMockupRef>;

    async fn load(&self, id: &str) -> Result<SavedMockup>;
}

pub fn share_url(store_url: &str, id: &str) -> String {
    format!("{}/mockup/{}", store_url.trim_end_matches('/'), id)
}

pub fn encode_data_url(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", general_purpose::STANDARD.encode(png))
}

/// Returns the content type and decoded bytes of a `data:image/...;base64,` URL.
pub fn decode_data_url(data_url: &str) -> Result<(String, Vec<u8>)> {
    if !data_url.starts_with("data:image/") {
        return Err(MockupError::Validation(
            "Invalid image format. Expected base64 data URL.".to_string(),
        ));
    }
    let (header, encoded) = data_url
        .split_once(',')
        .ok_or_else(|| MockupError::Validation("Data URL has no payload".to_string()))?;

    let content_type = header
        .trim_start_matches("data:")
        .split(';')
        .next()
        .unwrap_or("image/png")
        .to_string();

    let bytes = general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| MockupError::Validation(format!("Invalid image data: {}", e)))?;

    Ok((content_type, bytes))
}

/// Rasterizes and snapshots the scene from one consistent state, then stores both.
/// Refuses while any print is missing from the canvas, since the image would no
/// longer match the configuration.
pub async fn save_mockup(
    store: &dyn MockupStore,
    scene: &MockupScene,
    compositor: &Compositor,
) -> Result<SavedMockupRef> {
    if let Some((id, reason)) = compositor.omitted().iter().next() {
        return Err(MockupError::Render(format!(
            "print {} is not on the canvas: {}",
            id, reason
        )));
    }

    let raster_image = compositor.export_image()?;
    let config = scene.config();
    let request = SaveRequest {
        analysis_id: scene.analysis().id.clone(),
        raster_image,
        config,
    };

    let saved = store.save(request).await?;
    info!("Saved mockup {} for analysis {}", saved.id, scene.analysis().id);
    Ok(saved)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::mockup::compositor::DEFAULT_EXPORT_MULTIPLIER;
    use crate::mockup::compositor::tests::{FakeLoader, RecordingSurface};
    use crate::mockup::scene::Position;
    use crate::mockup::scene::tests::{photo_ref, scene, variant};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// Keeps saved mockups in a map; optionally refuses every save.
    #[derive(Default)]
    pub(crate) struct MemoryStore {
        pub saved: Mutex<HashMap<String, SaveRequest>>,
        pub offline: bool,
    }

    #[async_trait]
    impl MockupStore for MemoryStore {
        async fn save(&self, request: SaveRequest) -> Result<SavedMockupRef> {
            if self.offline {
                return Err(MockupError::Storage("storage unreachable".to_string()));
            }
            let mut saved = self.saved.lock().unwrap();
            let id = format!("m{}", saved.len() + 1);
            saved.insert(id.clone(), request);
            Ok(SavedMockupRef {
                share_url: share_url("https://store.test", &id),
                id,
            })
        }

        async fn load(&self, id: &str) -> Result<SavedMockup> {
            let saved = self.saved.lock().unwrap();
            let request = saved
                .get(id)
                .ok_or_else(|| MockupError::NotFound(format!("mockup {}", id)))?;
            Ok(SavedMockup {
                id: id.to_string(),
                analysis_id: request.analysis_id.clone(),
                raster_image: request.raster_image.clone(),
                content_type: "image/png".to_string(),
                config: request.config.clone(),
                share_url: share_url("https://store.test", id),
                created_at: Utc::now(),
            })
        }
    }

    fn compositor(loader: FakeLoader) -> Compositor {
        Compositor::new(
            Box::new(RecordingSurface::default()),
            Arc::new(loader),
            600,
            DEFAULT_EXPORT_MULTIPLIER,
        )
    }

    #[test]
    fn test_data_url_round_trip() {
        let url = encode_data_url(&[137, 80, 78, 71]);
        assert!(url.starts_with("data:image/png;base64,"));
        let (content_type, bytes) = decode_data_url(&url).unwrap();
        assert_eq!(content_type, "image/png");
        assert_eq!(bytes, vec![137, 80, 78, 71]);
    }

    #[test]
    fn test_decode_rejects_non_image_urls() {
        assert!(decode_data_url("data:text/plain;base64,aGk=").is_err());
        assert!(decode_data_url("data:image/png;base64").is_err());
        assert!(decode_data_url("data:image/png;base64,@@@").is_err());
    }

    #[test]
    fn test_share_url() {
        assert_eq!(
            share_url("https://store.test/", "abc"),
            "https://store.test/mockup/abc"
        );
    }

    #[tokio::test]
    async fn test_save_keeps_prints_in_add_order() {
        let store = MemoryStore::default();
        let mut comp = compositor(FakeLoader::default());
        let mut scene = scene();
        let a = scene.add_print(photo_ref(5, 1.5), variant(1, 24.0, 16.0)).unwrap();
        scene.add_print(photo_ref(3, 1.5), variant(2, 36.0, 24.0)).unwrap();
        scene.move_print(&a, Position::new(20.0, 30.0)).unwrap();
        comp.sync(&scene).await;

        let saved = save_mockup(&store, &scene, &comp).await.unwrap();

        let loaded = store.load(&saved.id).await.unwrap();
        assert_eq!(loaded.config.prints.len(), 2);
        assert_eq!(loaded.config.prints[0].photo_id, 5);
        assert_eq!(loaded.config.prints[0].position, Position::new(20.0, 30.0));
        assert_eq!(loaded.config.prints[1].photo_id, 3);
        assert_eq!(loaded.raster_image, b"raster@2".to_vec());
        assert_eq!(saved.share_url, format!("https://store.test/mockup/{}", saved.id));
    }

    #[tokio::test]
    async fn test_save_refuses_when_a_print_is_missing() {
        let store = MemoryStore::default();
        let mut comp = compositor(FakeLoader::breaking(&["https://cdn.test/photos/5.jpg"]));
        let mut scene = scene();
        scene.add_print(photo_ref(5, 1.5), variant(1, 24.0, 16.0)).unwrap();
        comp.sync(&scene).await;

        let err = save_mockup(&store, &scene, &comp).await.unwrap_err();

        assert!(matches!(err, MockupError::Render(_)));
        assert!(store.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure_is_surfaced_and_scene_kept() {
        let store = MemoryStore {
            offline: true,
            ..Default::default()
        };
        let mut comp = compositor(FakeLoader::default());
        let mut scene = scene();
        scene.add_print(photo_ref(5, 1.5), variant(1, 24.0, 16.0)).unwrap();
        comp.sync(&scene).await;

        let err = save_mockup(&store, &scene, &comp).await.unwrap_err();

        assert!(matches!(err, MockupError::Storage(_)));
        assert_eq!(scene.len(), 1);
    }
}
