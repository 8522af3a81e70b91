//! HTTP surface
//!
//! `GET /scan` runs a scan and answers with the merged hosts, `POST /scan`
//! streams progress events while the scan runs. Both go through the same
//! orchestrator and therefore share its single-flight gate.

pub mod error;
mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;

use crate::scanner::Orchestrator;
use crate::ScanError;
use error::ApiError;

pub use error::ApiErrorBody;
pub use routes::{ProfileSummary, ScanQuery, StreamScanBody};

/// Scan request bodies are a handful of short fields
const BODY_LIMIT: usize = 64 * 1024;

/// Shared handler state
pub struct AppState {
    pub orchestrator: Orchestrator,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }

    fn reject(&self, error: ScanError) -> ApiError {
        ApiError::new(error, self.orchestrator.detail_limit())
    }
}

/// Build the axum Router (useful for testing)
pub fn build_router(state: Arc<AppState>) -> Router {
    // Browser dashboards served from localhost only
    let cors = CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
            HeaderValue::from_static("http://localhost:5173"),
        ])
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/scan", get(routes::scan).post(routes::scan_stream))
        .route("/profiles", get(routes::list_profiles))
        .route("/health", get(routes::health_check))
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .with_state(state)
}

/// Serve the API until Ctrl+C
pub async fn start_server(listen_addr: SocketAddr, orchestrator: Orchestrator) -> anyhow::Result<()> {
    let app = build_router(Arc::new(AppState::new(orchestrator)));
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    log::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("API server shut down");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => log::info!("Shutdown signal received"),
        Err(e) => {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
