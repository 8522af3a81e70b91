//! Request handlers

use std::sync::Arc;

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::AppState;
use crate::output::encoded_stream;
use crate::scanner::ScanRequest;
use crate::utils::{ProfileOverrides, ScanProfile};
use crate::ScanError;

const STREAM_CONTENT_TYPE: &str = "application/json; charset=utf-8";

// ---------------------------------------------------------------------------
// GET /scan
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct ScanQuery {
    pub target: Option<String>,
    pub profile: Option<String>,
}

pub async fn scan(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ScanQuery>,
) -> Result<Response, ApiError> {
    let request = ScanRequest {
        target: query.target,
        profile: query.profile,
        overrides: ProfileOverrides::default(),
    };

    let report = state
        .orchestrator
        .run(&request)
        .await
        .map_err(|e| state.reject(e))?;

    Ok(([(header::CACHE_CONTROL, "no-store")], Json(report)).into_response())
}

// ---------------------------------------------------------------------------
// POST /scan
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct StreamScanBody {
    pub target: Option<String>,
    pub profile: Option<String>,
    #[serde(flatten)]
    pub overrides: ProfileOverrides,
}

pub async fn scan_stream(
    State(state): State<Arc<AppState>>,
    body: Result<Json<StreamScanBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body.map_err(|e| state.reject(ScanError::InvalidOption(e.body_text())))?;

    let request = ScanRequest {
        target: body.target,
        profile: body.profile,
        overrides: body.overrides,
    };

    let rx = state
        .orchestrator
        .run_streaming(&request)
        .map_err(|e| state.reject(e))?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, HeaderValue::from_static(STREAM_CONTENT_TYPE))
        .header(header::CACHE_CONTROL, HeaderValue::from_static("no-store"))
        .body(Body::from_stream(encoded_stream(rx)))
        .map_err(|e| state.reject(ScanError::Internal(e.to_string())))
}

// ---------------------------------------------------------------------------
// GET /profiles, GET /health
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub name: String,
    pub label: String,
    pub discovery: Vec<String>,
    pub ports: Vec<String>,
}

impl From<&ScanProfile> for ProfileSummary {
    fn from(profile: &ScanProfile) -> Self {
        Self {
            name: profile.name.clone(),
            label: profile.label.clone(),
            discovery: profile.discovery.clone(),
            ports: profile.ports.clone(),
        }
    }
}

pub async fn list_profiles(State(state): State<Arc<AppState>>) -> Json<Vec<ProfileSummary>> {
    Json(
        state
            .orchestrator
            .catalog()
            .list()
            .into_iter()
            .map(ProfileSummary::from)
            .collect(),
    )
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
    })
}
