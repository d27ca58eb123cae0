use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::db::DbError;
use crate::embedder::EmbedderError;

/// Errors surfaced to HTTP clients as `{"error": "<message>"}`.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Missing required query parameter 'prompt'")]
    MissingPrompt,

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbedderError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingPrompt => StatusCode::BAD_REQUEST,
            Self::Embedding(_) | Self::Database(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {self}");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
