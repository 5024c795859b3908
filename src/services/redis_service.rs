// src/services/redis_service.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::MockupError;
use crate::mockup::persistence::{
    MockupStore, SaveRequest, SavedMockup, SavedMockupRef, decode_data_url, encode_data_url,
    share_url,
};
use crate::mockup::scene::SceneConfig;

const MOCKUP_TTL_SECONDS: usize = 30 * 24 * 60 * 60;

#[derive(Debug, Serialize, Deserialize)]
struct StoredMockup {
    id: String,
    analysis_id: String,
    mockup_image: String,
    config: SceneConfig,
    created_at: DateTime<Utc>,
}

fn mockup_key(id: &str) -> String {
    format!("mockup:{}", id)
}

/// Saved mockups kept in Redis, indexed by wall analysis.
pub struct RedisService {
    client: Client,
    store_url: String,
}

impl RedisService {
    pub async fn new(redis_url: &str, store_url: &str) -> Result<Self, MockupError> {
        let client = Client::open(redis_url)?;

        // Test connection
        let mut conn = client.get_async_connection().await?;
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;

        Ok(Self {
            client,
            store_url: store_url.to_string(),
        })
    }
}

#[async_trait]
impl MockupStore for RedisService {
    async fn save(&self, request: SaveRequest) -> Result<SavedMockupRef, MockupError> {
        let mut conn = self.client.get_async_connection().await?;

        let id = Uuid::new_v4().to_string();
        let stored = StoredMockup {
            id: id.clone(),
            analysis_id: request.analysis_id,
            mockup_image: encode_data_url(&request.raster_image),
            config: request.config,
            created_at: Utc::now(),
        };
        let value = serde_json::to_string(&stored)?;

        conn.set_ex::<_, _, ()>(mockup_key(&id), value, MOCKUP_TTL_SECONDS)
            .await?;

        let analysis_key = format!("analysis:{}:mockups", stored.analysis_id);
        conn.sadd::<_, _, ()>(&analysis_key, &id).await?;

        Ok(SavedMockupRef {
            share_url: share_url(&self.store_url, &id),
            id,
        })
    }

    async fn load(&self, id: &str) -> Result<SavedMockup, MockupError> {
        let mut conn = self.client.get_async_connection().await?;

        let value: Option<String> = conn.get(mockup_key(id)).await?;
        let value = value.ok_or_else(|| MockupError::NotFound(format!("mockup {}", id)))?;
        let stored: StoredMockup = serde_json::from_str(&value)?;

        let (content_type, raster_image) = decode_data_url(&stored.mockup_image)?;

        Ok(SavedMockup {
            share_url: share_url(&self.store_url, &stored.id),
            id: stored.id,
            analysis_id: stored.analysis_id,
            raster_image,
            content_type,
            config: stored.config,
            created_at: stored.created_at,
        })
    }
}
