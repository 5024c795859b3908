// src/errors.rs
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

use crate::analysis::AnalysisStatus;

#[derive(Error, Debug)]
pub enum MockupError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Detection service error: {0}")]
    Detection(String),

    #[error("Wall analysis failed: {0}")]
    AnalysisFailed(String),

    #[error("Wall analysis timed out after {attempts} attempts")]
    Timeout { attempts: u32 },

    #[error("Invalid analysis transition from {from} to {to}")]
    InvalidTransition {
        from: AnalysisStatus,
        to: AnalysisStatus,
    },

    #[error("Wall analysis is not ready: {0}")]
    NotReady(AnalysisStatus),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Redis error: {0}")]
    Redis(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, MockupError>;

impl MockupError {
    /// Transient failures may be retried by the poller within its attempt bound.
    pub fn is_transient(&self) -> bool {
        matches!(self, MockupError::Detection(_))
    }
}

impl From<redis::RedisError> for MockupError {
    fn from(e: redis::RedisError) -> Self {
        MockupError::Redis(e.to_string())
    }
}

impl From<serde_json::Error> for MockupError {
    fn from(e: serde_json::Error) -> Self {
        MockupError::Serialization(e.to_string())
    }
}

impl ResponseError for MockupError {
    fn error_response(&self) -> HttpResponse {
        let body = |error: &str| {
            serde_json::json!({
                "error": error,
                "message": self.to_string()
            })
        };

        match self {
            MockupError::Validation(_) => {
                HttpResponse::BadRequest().json(body("Validation error"))
            }
            MockupError::Detection(_) | MockupError::Catalog(_) => {
                HttpResponse::ServiceUnavailable().json(body("Upstream service error"))
            }
            MockupError::AnalysisFailed(_) => {
                HttpResponse::UnprocessableEntity().json(body("Wall analysis failed"))
            }
            MockupError::Timeout { .. } => {
                HttpResponse::GatewayTimeout().json(body("Analysis timed out"))
            }
            MockupError::InvalidTransition { .. } => {
                HttpResponse::BadGateway().json(body("Inconsistent analysis state"))
            }
            MockupError::NotReady(_) => HttpResponse::Conflict().json(body("Analysis not ready")),
            MockupError::ImageProcessing(_) => {
                HttpResponse::BadRequest().json(body("Image processing error"))
            }
            MockupError::Render(_) => {
                HttpResponse::InternalServerError().json(body("Render error"))
            }
            MockupError::Storage(_) | MockupError::Redis(_) => {
                HttpResponse::InternalServerError().json(body("Save failed"))
            }
            MockupError::Serialization(_) => {
                HttpResponse::InternalServerError().json(body("Data processing error"))
            }
            MockupError::NotFound(_) => HttpResponse::NotFound().json(body("Not found")),
        }
    }
}
