// src/services/mod.rs
pub mod catalog_client;
pub mod image_loader;
pub mod image_processor;
pub mod raster_surface;
pub mod redis_service;
pub mod storage_client;

pub use catalog_client::{CatalogService, HttpCatalogClient};
pub use image_loader::{HttpImageLoader, ImageLoader};
pub use image_processor::ImageProcessor;
pub use raster_surface::RasterSurface;
pub use redis_service::RedisService;
pub use storage_client::StorageClient;
