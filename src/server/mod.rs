//! HTTP server for session management
//!
//! Exposes the pool's session lifecycle over REST: open a session against a
//! named model (or "default"), heartbeat it, probe its liveness, and close
//! it. Leases held by clients that stop heartbeating are reclaimed by the
//! pool's expiry sweep.

use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::engine::PlanEngine;

mod handlers;
mod routes;

pub use handlers::AppState;
pub use routes::api_routes;

/// Engine type served by the binary.
pub type ServerEngine = PlanEngine;

/// Start the HTTP session server.
pub async fn start(state: Arc<AppState<ServerEngine>>, config: ServerConfig) -> Result<()> {
    let mut app = Router::new()
        .merge(api_routes::<ServerEngine>())
        .with_state(state);

    if config.cors_enabled {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }
    if config.request_logging {
        app = app.layer(TraceLayer::new_for_http());
    }

    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("API endpoints:");
    tracing::info!("  GET    /health - Health check");
    tracing::info!("  GET    /v1/models - List model bundles and availability");
    tracing::info!("  POST   /v1/sessions - Open a session (lease an engine)");
    tracing::info!("  GET    /v1/sessions/:id - Session liveness");
    tracing::info!("  PUT    /v1/sessions/:id - Switch a session to another model");
    tracing::info!("  POST   /v1/sessions/:id/heartbeat - Keep a session alive");
    tracing::info!("  POST   /v1/sessions/:id/infer - Detect objects in one image");
    tracing::info!("  DELETE /v1/sessions/:id - Close a session");

    axum::serve(listener, app).await?;

    Ok(())
}
