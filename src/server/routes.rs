//! Route definitions

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{
    change_session, create_session, delete_session, get_session, health, heartbeat_session, infer,
    list_models, AppState,
};
use crate::engine::Engine;

/// Create the API router for the session lifecycle
pub fn api_routes<E: Engine>() -> Router<Arc<AppState<E>>> {
    Router::new()
        // Health check
        .route("/health", get(health))
        // Model bundles
        .route("/v1/models", get(list_models))
        // Session lifecycle
        .route("/v1/sessions", post(create_session))
        .route(
            "/v1/sessions/:id",
            get(get_session)
                .put(change_session)
                .delete(delete_session),
        )
        .route("/v1/sessions/:id/heartbeat", post(heartbeat_session))
        .route("/v1/sessions/:id/infer", post(infer))
}
