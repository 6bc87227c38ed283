//! API error type shared by the resource handlers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::media::MediaError;

/// JSON error body returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Database not available")]
    DatabaseUnavailable,

    /// Raw database errors stay in the logs; clients get a generic message.
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Media(#[from] MediaError),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::DatabaseUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Media(MediaError::NotConfigured) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Media(MediaError::InvalidImage(_)) => StatusCode::BAD_REQUEST,
            ApiError::Media(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::Database(e) => {
                tracing::error!(error = %e, "database error");
                ErrorResponse::new("Database error")
            }
            ApiError::Media(MediaError::InvalidImage(reason)) => ErrorResponse {
                error: "Invalid image".to_string(),
                message: Some(reason.clone()),
            },
            ApiError::Media(e) => {
                tracing::error!(error = %e, "media storage error");
                ErrorResponse::new(match e {
                    MediaError::NotConfigured => "Media storage not configured",
                    _ => "Media storage error",
                })
            }
            other => ErrorResponse::new(other.to_string()),
        };

        (status, Json(body)).into_response()
    }
}
