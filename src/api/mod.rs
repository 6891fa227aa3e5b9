//! HTTP/WebSocket API server.
//!
//! Endpoints:
//! - User signup/login (opaque token issuance)
//! - Meeting creation and lookup
//! - Document upload with background indexing
//! - The live audio WebSocket that feeds the session coordinator

pub mod error;
pub mod routes;

use crate::app::AppContext;
use anyhow::Result;
use axum::{response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceBuilder;
use tracing::info;

pub struct ApiServer {
    context: Arc<AppContext>,
}

impl ApiServer {
    pub fn new(context: Arc<AppContext>) -> Self {
        Self { context }
    }

    pub async fn start(self) -> Result<()> {
        let host = self.context.config.server.host.clone();
        let port = self.context.config.server.port;

        let app = Router::new()
            .route("/", get(status))
            .route("/version", get(version))
            .nest(
                "/api",
                routes::users::router()
                    .merge(routes::meetings::router())
                    .merge(routes::files::router()),
            )
            .nest("/ws", routes::audio::router())
            .layer(ServiceBuilder::new())
            .with_state(self.context);

        let listener = tokio::net::TcpListener::bind(&format!("{}:{}", host, port)).await?;

        info!("API server listening on http://{}:{}", host, port);
        info!("Endpoints:");
        info!("  GET  /              - Service info");
        info!("  GET  /version       - Version info");
        info!("  POST /api/signup    - Register a user");
        info!("  POST /api/login     - Obtain an access token");
        info!("  POST /api/meeting   - Create a meeting");
        info!("  GET  /api/meeting/:id - Get a meeting");
        info!("  POST /api/upload    - Upload a meeting document");
        info!("  GET  /ws/audio      - Live transcription WebSocket");

        axum::serve(listener, app).await?;

        Ok(())
    }
}

async fn status() -> Json<Value> {
    Json(json!({
        "service": "ideastream",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

async fn version() -> Json<Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "name": "ideastream"
    }))
}
