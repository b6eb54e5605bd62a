//! REST API server for recapd.
//!
//! Provides HTTP endpoints for:
//! - Meeting creation with audio upload (triggers processing)
//! - Processing status polling
//! - Manual re-transcription and re-summarization
//! - Speaker label listing and batch name mapping
//! - Publishing to the wiki and chat connectors

pub mod error;
pub mod routes;

use anyhow::Result;
use axum::{extract::DefaultBodyLimit, response::Json, routing::get, Router};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tracing::info;

pub use routes::ApiState;

pub struct ApiServer {
    port: u16,
    state: ApiState,
}

impl ApiServer {
    pub fn new(port: u16, state: ApiState) -> Self {
        Self { port, state }
    }

    pub fn router(state: ApiState) -> Router {
        // Multipart bodies carry the audio payload; leave headroom over the
        // configured upload ceiling for the other form fields.
        let body_limit = (state.max_upload_bytes as usize).saturating_add(64 * 1024);

        Router::new()
            .route("/", get(service_info))
            .route("/version", get(version))
            .merge(routes::meetings::router(state.clone()))
            .merge(routes::speakers::router(state.clone()))
            .merge(routes::publish::router(state))
            .layer(ServiceBuilder::new().layer(DefaultBodyLimit::max(body_limit)))
    }

    pub async fn start(self) -> Result<()> {
        let app = Self::router(self.state);

        let listener = tokio::net::TcpListener::bind(&format!("127.0.0.1:{}", self.port)).await?;

        info!("API server listening on http://127.0.0.1:{}", self.port);
        info!("Endpoints:");
        info!("  POST   /meetings                    - Create meeting (multipart, optional audio)");
        info!("  GET    /meetings/:id                - Full meeting record with chat view");
        info!("  GET    /meetings/:id/status         - Processing status");
        info!("  DELETE /meetings/:id                - Delete meeting and audio");
        info!("  POST   /meetings/:id/transcribe     - Re-run transcription");
        info!("  POST   /meetings/:id/summarize      - Re-run summarization");
        info!("  GET    /meetings/:id/speakers       - Speaker labels and mappings");
        info!("  PATCH  /meetings/:id/speakers       - Batch speaker name mapping");
        info!("  POST   /meetings/:id/publish/wiki   - Publish minutes to the wiki");
        info!("  POST   /meetings/:id/publish/chat   - Share summary to chat");
        info!("  GET    /meetings/:id/publish/status - Publishing cross-references");

        axum::serve(listener, app).await?;

        Ok(())
    }
}

async fn service_info() -> Json<Value> {
    Json(json!({
        "service": "recapd",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

async fn version() -> Json<Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "name": "recapd"
    }))
}
