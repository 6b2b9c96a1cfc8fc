//! Application error types and Axum response conversion.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rootcause_core::DiagnosisError;
use rootcause_monitor::StoreError;
use serde::Serialize;

/// Application-level errors with HTTP status code mapping.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    /// The investigation could not start on the data provided.
    Unprocessable(String),
    Internal(String),
}

impl From<DiagnosisError> for AppError {
    fn from(e: DiagnosisError) -> Self {
        match e {
            DiagnosisError::InsufficientData(_) => AppError::Unprocessable(e.to_string()),
            DiagnosisError::Graph(_) => AppError::BadRequest(e.to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Internal(e.to_string())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            AppError::Unprocessable(m) => (StatusCode::UNPROCESSABLE_ENTITY, m),
            AppError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
