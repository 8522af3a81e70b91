//! Mapping of scan errors onto HTTP responses

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{truncate_detail, ScanError};

/// Body of every failed request: `{"error": ..., "detail": ...}`
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub error: String,
    pub detail: String,
}

/// A scan error on its way to the client
#[derive(Debug)]
pub struct ApiError {
    error: ScanError,
    detail_limit: usize,
}

impl ApiError {
    pub fn new(error: ScanError, detail_limit: usize) -> Self {
        Self {
            error,
            detail_limit,
        }
    }

    pub fn status(&self) -> StatusCode {
        if self.error.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("Scan failed: {}", self.error);
        } else {
            log::debug!("Rejected scan request: {}", self.error);
        }

        let body = ApiErrorBody {
            error: self.error.kind().to_string(),
            detail: truncate_detail(&self.error.detail(), self.detail_limit),
        };

        (status, [(header::CACHE_CONTROL, "no-store")], Json(body)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.error, self.status())
    }
}
