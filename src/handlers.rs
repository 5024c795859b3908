// src/handlers.rs
use crate::{
    AppState,
    analysis::{DEFAULT_CEILING_HEIGHT_FEET, WallBounds},
    errors::MockupError,
    mockup::{
        LaunchOptions, MockupEditor, PhotoRef, PixelRect, PrintId, crop_preview,
        crop::CropFractions,
    },
    models::{ImageRef, Photo, PrintVariant},
    services::{RasterSurface, image_processor::MAX_UPLOAD_BYTES},
};
use actix_multipart::Multipart;
use actix_web::{Error, HttpResponse, web};
use futures_util::TryStreamExt;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// The image part plus any plain text fields of a wall upload form.
struct WallForm {
    image: Option<(String, String, Vec<u8>)>,
    fields: HashMap<String, String>,
}

impl WallForm {
    fn number<T: std::str::FromStr>(&self, name: &str) -> Result<Option<T>, MockupError> {
        match self.fields.get(name) {
            Some(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| MockupError::Validation(format!("{} is not a number", name))),
            None => Ok(None),
        }
    }
}

async fn read_wall_form(mut payload: Multipart) -> Result<WallForm, Error> {
    let mut form = WallForm {
        image: None,
        fields: HashMap::new(),
    };

    while let Some(mut field) = payload.try_next().await? {
        let content_disposition = field.content_disposition();
        let name = content_disposition.get_name().unwrap_or_default().to_string();
        let filename = content_disposition.get_filename().map(|f| f.to_string());

        let content_type = field
            .content_type()
            .map(|ct| ct.to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let mut data = Vec::new();
        while let Some(chunk) = field.try_next().await? {
            if data.len() + chunk.len() > MAX_UPLOAD_BYTES {
                return Err(MockupError::Validation("Image too large (max 10MB)".to_string()).into());
            }
            data.extend_from_slice(&chunk);
        }

        if name == "image" {
            let filename = filename.unwrap_or_else(|| "wall".to_string());
            form.image = Some((filename, content_type, data));
        } else {
            let value = String::from_utf8(data)
                .map_err(|_| MockupError::Validation(format!("{} is not text", name)))?;
            form.fields.insert(name, value);
        }
    }

    Ok(form)
}

async fn catalog_selection(
    data: &AppState,
    photo_id: u64,
    variant_id: u64,
) -> Result<(Photo, PrintVariant), MockupError> {
    let photo = data.catalog.photo(photo_id).await?;
    let variant = photo.variant(variant_id).cloned().ok_or_else(|| {
        MockupError::NotFound(format!("variant {} of photo {}", variant_id, photo_id))
    })?;
    Ok((photo, variant))
}

fn launch_editor(data: &AppState, preselected: Option<(Photo, PrintVariant)>) -> MockupEditor {
    MockupEditor::launch(
        data.editor_services.clone(),
        Box::new(RasterSurface::new()),
        LaunchOptions {
            preselected,
            on_close: Some(Box::new(|| info!("Mockup editor closed"))),
            canvas_width: data.settings.canvas_width,
            export_multiplier: data.settings.export_multiplier,
        },
    )
}

pub async fn create_wall(payload: Multipart, data: web::Data<AppState>) -> Result<HttpResponse, Error> {
    let form = read_wall_form(payload).await?;
    let (filename, content_type, image_data) = form
        .image
        .as_ref()
        .ok_or_else(|| MockupError::Validation("No image provided".to_string()))?;

    let upload = data
        .image_processor
        .validate_upload(filename, content_type, image_data)?;

    let preselected = match (form.number::<u64>("photo_id")?, form.number::<u64>("variant_id")?) {
        (Some(photo_id), Some(variant_id)) => {
            Some(catalog_selection(&data, photo_id, variant_id).await?)
        }
        (None, None) => None,
        _ => {
            return Err(MockupError::Validation(
                "photo_id and variant_id must be given together".to_string(),
            )
            .into());
        }
    };

    let (session_id, editor) = data.sessions.open(launch_editor(&data, preselected));

    let submitted = {
        let mut editor = editor.lock().await;
        let result = editor.submit_wall(upload).await.map(|_| ());
        result.map(|_| editor.pending_analysis_id().map(str::to_string))
    };
    let pending = match submitted {
        Ok(pending) => pending,
        Err(e) => {
            data.sessions.close(&session_id).await?;
            return Err(e.into());
        }
    };
    if let Some(analysis_id) = pending {
        data.sessions
            .start_polling(&session_id, data.editor_services.poller.clone(), analysis_id)?;
    }

    let snapshot = editor.lock().await.snapshot();
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "session_id": session_id,
        "analysis": snapshot.analysis,
        "phase": snapshot.phase,
    })))
}

pub async fn create_manual_wall(
    payload: Multipart,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let form = read_wall_form(payload).await?;
    let (filename, content_type, image_data) = form
        .image
        .as_ref()
        .ok_or_else(|| MockupError::Validation("No image provided".to_string()))?;
    let ceiling_height_feet = form
        .number::<f64>("ceiling_height_feet")?
        .unwrap_or(DEFAULT_CEILING_HEIGHT_FEET);

    let upload = data
        .image_processor
        .validate_upload(filename, content_type, image_data)?;

    let (session_id, editor) = data.sessions.open(launch_editor(&data, None));
    let started = {
        let mut editor = editor.lock().await;
        let result = editor
            .start_manual(
                ImageRef::inline(upload.content_type, upload.data),
                upload.width,
                upload.height,
                ceiling_height_feet,
            )
            .await;
        result.map(|_| editor.snapshot())
    };
    let snapshot = match started {
        Ok(snapshot) => snapshot,
        Err(e) => {
            data.sessions.close(&session_id).await?;
            return Err(e.into());
        }
    };

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "session_id": session_id,
        "analysis": snapshot.analysis,
        "phase": snapshot.phase,
    })))
}

pub async fn get_session(path: web::Path<Uuid>, data: web::Data<AppState>) -> Result<HttpResponse, Error> {
    let editor = data.sessions.get(&path.into_inner())?;
    let snapshot = editor.lock().await.snapshot();
    Ok(HttpResponse::Ok().json(&snapshot))
}

#[derive(Debug, Deserialize)]
pub struct CeilingRequest {
    pub ceiling_height_feet: f64,
}

pub async fn update_ceiling(
    path: web::Path<Uuid>,
    data: web::Data<AppState>,
    body: web::Json<CeilingRequest>,
) -> Result<HttpResponse, Error> {
    let editor = data.sessions.get(&path.into_inner())?;
    let mut editor = editor.lock().await;
    editor.update_ceiling_height(body.ceiling_height_feet).await?;
    Ok(HttpResponse::Ok().json(&editor.snapshot()))
}

pub async fn set_bounds(
    path: web::Path<Uuid>,
    data: web::Data<AppState>,
    body: web::Json<WallBounds>,
) -> Result<HttpResponse, Error> {
    let editor = data.sessions.get(&path.into_inner())?;
    let mut editor = editor.lock().await;
    editor.set_wall_bounds(body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(&editor.snapshot()))
}

#[derive(Debug, Deserialize)]
pub struct AddPrintRequest {
    pub photo_id: u64,
    pub variant_id: u64,
}

pub async fn add_print(
    path: web::Path<Uuid>,
    data: web::Data<AppState>,
    body: web::Json<AddPrintRequest>,
) -> Result<HttpResponse, Error> {
    let editor = data.sessions.get(&path.into_inner())?;
    let (photo, variant) = catalog_selection(&data, body.photo_id, body.variant_id).await?;

    let mut editor = editor.lock().await;
    let print_id = editor.add_print(PhotoRef::from(&photo), variant).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "print_id": print_id,
        "session": editor.snapshot(),
    })))
}

pub async fn move_print(
    path: web::Path<(Uuid, String)>,
    data: web::Data<AppState>,
    body: web::Json<PixelRect>,
) -> Result<HttpResponse, Error> {
    let (session_id, print_id) = path.into_inner();
    let editor = data.sessions.get(&session_id)?;
    let position = editor
        .lock()
        .await
        .commit_gesture(&PrintId::from(print_id.as_str()), body.into_inner())?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "position": position })))
}

pub async fn remove_print(
    path: web::Path<(Uuid, String)>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let (session_id, print_id) = path.into_inner();
    let editor = data.sessions.get(&session_id)?;
    editor
        .lock()
        .await
        .remove_print(&PrintId::from(print_id.as_str()))
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn preview(path: web::Path<Uuid>, data: web::Data<AppState>) -> Result<HttpResponse, Error> {
    let editor = data.sessions.get(&path.into_inner())?;
    let mut editor = editor.lock().await;
    editor.refresh().await?;
    let png = editor.export_image()?;
    Ok(HttpResponse::Ok().content_type("image/png").body(png))
}

pub async fn save_session(path: web::Path<Uuid>, data: web::Data<AppState>) -> Result<HttpResponse, Error> {
    let editor = data.sessions.get(&path.into_inner())?;
    let saved = editor.lock().await.save().await?;
    Ok(HttpResponse::Ok().json(&saved))
}

pub async fn close_session(path: web::Path<Uuid>, data: web::Data<AppState>) -> Result<HttpResponse, Error> {
    data.sessions.close(&path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[derive(Debug, Deserialize)]
pub struct CropPreviewRequest {
    pub source_ratio: f64,
    pub print_width: f64,
    pub print_height: f64,
}

#[derive(Debug, Serialize)]
struct CropPreviewResponse {
    exact_fit: bool,
    #[serde(flatten)]
    fractions: CropFractions,
}

pub async fn crop_preview_handler(body: web::Json<CropPreviewRequest>) -> Result<HttpResponse, Error> {
    let preview = crop_preview(body.source_ratio, body.print_width, body.print_height)?;
    Ok(HttpResponse::Ok().json(CropPreviewResponse {
        exact_fit: preview.is_exact_fit(),
        fractions: preview.fractions(),
    }))
}

pub async fn get_mockup(path: web::Path<String>, data: web::Data<AppState>) -> Result<HttpResponse, Error> {
    let saved = data.editor_services.store.load(&path.into_inner()).await?;
    Ok(HttpResponse::Ok()
        .content_type(saved.content_type)
        .body(saved.raster_image))
}

pub async fn get_mockup_config(
    path: web::Path<String>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let saved = data.editor_services.store.load(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "id": saved.id,
        "analysis_id": saved.analysis_id,
        "config": saved.config,
        "share_url": saved.share_url,
        "created_at": saved.created_at,
    })))
}
