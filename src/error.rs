//! HTTP-facing error type.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Bad request body (missing image, malformed JSON).
    #[error("{0}")]
    Validation(String),

    #[error("Invalid base64 image data: {0}")]
    Decode(#[from] base64::DecodeError),

    /// OCR or generative API failure.
    #[error("{0:#}")]
    Collaborator(anyhow::Error),

    /// Model output could not be parsed and the policy says to surface it.
    #[error("{0:#}")]
    Extraction(anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Decode(_) | AppError::Collaborator(_) | AppError::Extraction(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        error!("Request failed ({}): {}", status, message);
        (status, Json(json!({ "error": message }))).into_response()
    }
}
