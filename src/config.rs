// src/config.rs
use anyhow::{Context, bail};
use std::str::FromStr;
use std::time::Duration;

use crate::analysis::PollConfig;
use crate::mockup::compositor::DEFAULT_EXPORT_MULTIPLIER;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Redis,
    Http,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_addr: String,
    pub detection_service_url: String,
    pub catalog_service_url: String,
    pub storage_backend: StorageBackend,
    pub redis_url: String,
    pub storage_service_url: String,
    pub store_url: String,
    pub poll: PollConfig,
    pub canvas_width: u32,
    pub export_multiplier: f64,
    /// Sessions untouched for this long are closed by the sweeper.
    pub session_idle_ttl: Duration,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let storage_backend = match text("STORAGE_BACKEND", "redis").to_lowercase().as_str() {
            "redis" => StorageBackend::Redis,
            "http" => StorageBackend::Http,
            other => bail!("STORAGE_BACKEND must be 'redis' or 'http', got '{}'", other),
        };

        let poll_interval_ms: u64 = number(&lookup, "POLL_INTERVAL_MS", 1000)?;
        let max_attempts: u32 = number(&lookup, "POLL_MAX_ATTEMPTS", 30)?;
        if max_attempts == 0 {
            bail!("POLL_MAX_ATTEMPTS must be at least 1");
        }

        let canvas_width: u32 = number(&lookup, "CANVAS_WIDTH", 1200)?;
        if canvas_width == 0 {
            bail!("CANVAS_WIDTH must be at least 1");
        }
        let export_multiplier: f64 = number(&lookup, "EXPORT_MULTIPLIER", DEFAULT_EXPORT_MULTIPLIER)?;
        if !(export_multiplier.is_finite() && export_multiplier > 0.0) {
            bail!("EXPORT_MULTIPLIER must be positive, got {}", export_multiplier);
        }

        let session_idle_secs: u64 = number(&lookup, "SESSION_IDLE_TTL_SECS", 1800)?;
        if session_idle_secs == 0 {
            bail!("SESSION_IDLE_TTL_SECS must be at least 1");
        }

        Ok(Self {
            bind_addr: text("BIND_ADDR", "0.0.0.0:8080"),
            detection_service_url: text(
                "DETECTION_SERVICE_URL",
                "http://127.0.0.1:8000/api/wall-analysis",
            ),
            catalog_service_url: text("CATALOG_SERVICE_URL", "http://127.0.0.1:8000/api"),
            storage_backend,
            redis_url: text("REDIS_URL", "redis://127.0.0.1:6379"),
            storage_service_url: text("STORAGE_SERVICE_URL", "http://127.0.0.1:8000/api/mockups"),
            store_url: text("STORE_URL", "http://127.0.0.1:3000"),
            poll: PollConfig {
                interval: Duration::from_millis(poll_interval_ms),
                max_attempts,
            },
            canvas_width,
            export_multiplier,
            session_idle_ttl: Duration::from_secs(session_idle_secs),
        })
    }
}

fn number<T, F>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value '{}'", key, raw)),
        None => Ok(default),
    }
}
