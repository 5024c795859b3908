// src/main.rs
use actix_web::{App, HttpResponse, HttpServer, middleware, web};
use anyhow::Context;
use log::info;
use std::sync::Arc;
use std::time::Duration;

mod analysis;
mod config;
mod errors;
mod handlers;
mod mockup;
mod models;
mod services;
mod sessions;

use crate::analysis::{AnalysisPoller, HttpDetectionClient};
use crate::config::{Settings, StorageBackend};
use crate::handlers::{
    add_print, close_session, create_manual_wall, create_wall, crop_preview_handler, get_mockup,
    get_mockup_config, get_session, move_print, preview, remove_print, save_session, set_bounds,
    update_ceiling,
};
use crate::mockup::{EditorServices, MockupStore};
use crate::services::{
    CatalogService, HttpCatalogClient, HttpImageLoader, ImageProcessor, RedisService,
    StorageClient,
};
use crate::sessions::{SessionRegistry, spawn_idle_sweeper};

#[derive(Clone)]
pub struct AppState {
    settings: Arc<Settings>,
    sessions: Arc<SessionRegistry>,
    editor_services: EditorServices,
    catalog: Arc<dyn CatalogService>,
    image_processor: Arc<ImageProcessor>,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    info!("Starting wallview service...");

    let settings = Settings::from_env().context("invalid configuration")?;

    // Initialize services
    let store: Arc<dyn MockupStore> = match settings.storage_backend {
        StorageBackend::Redis => Arc::new(
            RedisService::new(&settings.redis_url, &settings.store_url)
                .await
                .with_context(|| format!("cannot reach redis at {}", settings.redis_url))?,
        ),
        StorageBackend::Http => Arc::new(StorageClient::new(&settings.storage_service_url)),
    };
    let detection = Arc::new(HttpDetectionClient::new(&settings.detection_service_url));

    let sessions = Arc::new(SessionRegistry::with_idle_ttl(settings.session_idle_ttl));
    spawn_idle_sweeper(
        &sessions,
        (settings.session_idle_ttl / 4).max(Duration::from_secs(1)),
    );

    let app_state = AppState {
        sessions,
        editor_services: EditorServices {
            poller: AnalysisPoller::new(detection, settings.poll),
            loader: Arc::new(HttpImageLoader::new()),
            store,
        },
        catalog: Arc::new(HttpCatalogClient::new(&settings.catalog_service_url)),
        image_processor: Arc::new(ImageProcessor::new()),
        settings: Arc::new(settings.clone()),
    };

    info!("Starting HTTP server on {}", settings.bind_addr);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(middleware::Logger::default())
            .service(
                web::scope("/api/v1")
                    .route("/walls", web::post().to(create_wall))
                    .route("/walls/manual", web::post().to(create_manual_wall))
                    .route("/sessions/{id}", web::get().to(get_session))
                    .route("/sessions/{id}", web::delete().to(close_session))
                    .route("/sessions/{id}/ceiling", web::patch().to(update_ceiling))
                    .route("/sessions/{id}/bounds", web::put().to(set_bounds))
                    .route("/sessions/{id}/prints", web::post().to(add_print))
                    .route(
                        "/sessions/{id}/prints/{print_id}",
                        web::patch().to(move_print),
                    )
                    .route(
                        "/sessions/{id}/prints/{print_id}",
                        web::delete().to(remove_print),
                    )
                    .route("/sessions/{id}/preview", web::get().to(preview))
                    .route("/sessions/{id}/save", web::post().to(save_session))
                    .route("/crop-preview", web::post().to(crop_preview_handler))
                    .route("/mockups/{id}", web::get().to(get_mockup))
                    .route("/mockups/{id}/config", web::get().to(get_mockup_config)),
            )
            .route("/health", web::get().to(health_check))
    })
    .bind(&settings.bind_addr)?
    .run()
    .await?;

    Ok(())
}

async fn health_check(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "wallview",
        "version": env!("CARGO_PKG_VERSION"),
        "open_sessions": data.sessions.len(),
    }))
}
