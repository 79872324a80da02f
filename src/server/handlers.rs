//! HTTP request handlers

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    body::Bytes,
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::engine::{
    Detection, Engine, ModelPool, ModelSession, PoolError, SessionManager, DEFAULT_MODEL_KEYWORD,
};

/// Shared application state
///
/// Sessions opened over HTTP are owned here, keyed by session id; dropping
/// an entry releases its lease back to the pool.
pub struct AppState<E> {
    pub manager: SessionManager<E>,
    sessions: Mutex<HashMap<String, ModelSession<E>>>,
}

impl<E> AppState<E> {
    pub fn new(pool: Arc<ModelPool<E>>) -> Self {
        Self {
            manager: SessionManager::new(pool),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, ModelSession<E>>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// List model bundles with current availability
pub async fn list_models<E: Engine>(State(state): State<Arc<AppState<E>>>) -> impl IntoResponse {
    let pool = state.manager.pool();
    let data = pool
        .model_names()
        .into_iter()
        .map(|name| {
            let available = pool.available_count(&name).unwrap_or(0);
            ModelStatus {
                is_default: name == pool.default_model_name(),
                name,
                available,
            }
        })
        .collect();

    let response = ModelsResponse {
        default_model: pool.default_model_name().to_string(),
        models: data,
    };
    (StatusCode::OK, Json(response))
}

/// Open a session: lease an engine instance and register the session id
pub async fn create_session<E: Engine>(
    State(state): State<Arc<AppState<E>>>,
    Json(request): Json<CreateSessionRequest>,
) -> Response {
    let requested = request
        .model
        .unwrap_or_else(|| DEFAULT_MODEL_KEYWORD.to_string());

    match state.manager.open(&requested) {
        Ok(Some(session)) => {
            let response = SessionResponse {
                session_id: session.id().to_string(),
                model: session.model_name().to_string(),
                alive: true,
            };
            state
                .sessions()
                .insert(session.id().to_string(), session);
            (StatusCode::CREATED, Json(response)).into_response()
        }
        Ok(None) => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("no engine instance available for model '{requested}'"),
            "exhausted",
        ),
        Err(PoolError::ModelNotFound(name)) => error_response(
            StatusCode::NOT_FOUND,
            format!("model not found: {name}"),
            "invalid_request_error",
        ),
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            e.to_string(),
            "server_error",
        ),
    }
}

/// Report whether a session is still live (and sweep its bundle)
pub async fn get_session<E: Engine>(
    State(state): State<Arc<AppState<E>>>,
    Path(session_id): Path<String>,
) -> Response {
    let mut sessions = state.sessions();
    let Some(session) = sessions.get(&session_id) else {
        return error_response(
            StatusCode::NOT_FOUND,
            format!("unknown session: {session_id}"),
            "invalid_request_error",
        );
    };

    let alive = session.is_live().unwrap_or(false);
    let response = SessionResponse {
        session_id: session_id.clone(),
        model: session.model_name().to_string(),
        alive,
    };
    if !alive {
        // Expired under us; drop our ownership so the lease bookkeeping
        // is cleared on this side too.
        tracing::warn!(%session_id, "session expired");
        sessions.remove(&session_id);
    }
    (StatusCode::OK, Json(response)).into_response()
}

/// Run detection on one image with the session's leased engine
///
/// The session map lock only covers the lookup; inference itself runs on
/// the blocking pool with a cloned engine handle, so other sessions keep
/// opening, heartbeating, and inferring while an engine is busy.
pub async fn infer<E: Engine>(
    State(state): State<Arc<AppState<E>>>,
    Path(session_id): Path<String>,
    body: Bytes,
) -> Response {
    let engine = {
        let mut sessions = state.sessions();
        let Some(session) = sessions.get(&session_id) else {
            return error_response(
                StatusCode::NOT_FOUND,
                format!("unknown session: {session_id}"),
                "invalid_request_error",
            );
        };

        if !session.is_live().unwrap_or(false) {
            tracing::warn!(%session_id, "session expired");
            sessions.remove(&session_id);
            return error_response(
                StatusCode::GONE,
                format!("session expired: {session_id}"),
                "session_expired",
            );
        }

        Arc::clone(session.engine())
    };

    match tokio::task::spawn_blocking(move || engine.infer(&body)).await {
        Ok(Ok(detections)) => (StatusCode::OK, Json(InferResponse { detections })).into_response(),
        Ok(Err(e)) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            e.to_string(),
            "server_error",
        ),
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("inference task failed: {e}"),
            "server_error",
        ),
    }
}

/// Refresh a session's heartbeat
pub async fn heartbeat_session<E: Engine>(
    State(state): State<Arc<AppState<E>>>,
    Path(session_id): Path<String>,
) -> Response {
    let sessions = state.sessions();
    match sessions.get(&session_id) {
        Some(session) => match session.heartbeat() {
            Ok(()) => StatusCode::NO_CONTENT.into_response(),
            Err(e) => error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                e.to_string(),
                "server_error",
            ),
        },
        None => error_response(
            StatusCode::NOT_FOUND,
            format!("unknown session: {session_id}"),
            "invalid_request_error",
        ),
    }
}

/// Switch a session to another model bundle, keeping its session id
pub async fn change_session<E: Engine>(
    State(state): State<Arc<AppState<E>>>,
    Path(session_id): Path<String>,
    Json(request): Json<ChangeSessionRequest>,
) -> Response {
    // Validate the target up front so a typo'd name does not cost the
    // caller their current lease.
    let resolved = state
        .manager
        .resolve_model_name(&request.model)
        .to_string();
    if !state.manager.pool().model_exists(&resolved) {
        return error_response(
            StatusCode::NOT_FOUND,
            format!("model not found: {resolved}"),
            "invalid_request_error",
        );
    }

    let Some(session) = state.sessions().remove(&session_id) else {
        return error_response(
            StatusCode::NOT_FOUND,
            format!("unknown session: {session_id}"),
            "invalid_request_error",
        );
    };

    match state.manager.change(session, &resolved) {
        Ok(Some(moved)) => {
            let response = SessionResponse {
                session_id: moved.id().to_string(),
                model: moved.model_name().to_string(),
                alive: true,
            };
            state.sessions().insert(moved.id().to_string(), moved);
            (StatusCode::OK, Json(response)).into_response()
        }
        // The old lease is already released by this point, so the
        // session is over. The caller must open a new one.
        Ok(None) => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("no engine instance available for model '{resolved}'; session released"),
            "exhausted",
        ),
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            e.to_string(),
            "server_error",
        ),
    }
}

/// Close a session and return its engine instance to the pool
pub async fn delete_session<E: Engine>(
    State(state): State<Arc<AppState<E>>>,
    Path(session_id): Path<String>,
) -> Response {
    // Dropping the session releases the lease.
    match state.sessions().remove(&session_id) {
        Some(_session) => StatusCode::NO_CONTENT.into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            format!("unknown session: {session_id}"),
            "invalid_request_error",
        ),
    }
}

fn error_response(status: StatusCode, message: String, kind: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: ErrorDetail {
                message,
                r#type: kind.to_string(),
            },
        }),
    )
        .into_response()
}

// Request types

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    /// Model bundle name; omitted or "default" selects the configured
    /// default model.
    pub model: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeSessionRequest {
    pub model: String,
}

// Response types

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub default_model: String,
    pub models: Vec<ModelStatus>,
}

#[derive(Debug, Serialize)]
pub struct ModelStatus {
    pub name: String,
    pub available: usize,
    pub is_default: bool,
}

#[derive(Debug, Serialize)]
pub struct InferResponse {
    pub detections: Vec<Detection>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub model: String,
    pub alive: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub message: String,
    pub r#type: String,
}
