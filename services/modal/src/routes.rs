//! Modal service routes
//!
//! `/interactions` receives raw events forwarded by the gateway process.
//! It carries no request signature check and must stay on an internal
//! network.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    custom_id::is_valid_session_id,
    error::{ApiError, ApiResult},
    models::SessionStatus,
    state::AppState,
};

/// Body of `PUT /sessions/:session_id/status`
#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: SessionStatus,
}

/// Create the router for the modal service
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/interactions", post(route_interaction))
        .route("/sessions/:session_id/status", put(update_session_status))
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = match &state.db_pool {
        Some(pool) => match common::database::health_check(pool).await {
            Ok(true) => "ok",
            _ => "unavailable",
        },
        None => "in-memory",
    };

    let (status, label) = if database == "unavailable" {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    } else {
        (StatusCode::OK, "ok")
    };

    (
        status,
        Json(json!({
            "status": label,
            "service": "modal-service",
            "database": database,
        })),
    )
}

/// Hand one raw event to the session router
pub async fn route_interaction(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> ApiResult<impl IntoResponse> {
    let outcome = state.router.route(&payload).await?;

    Ok(Json(json!({
        "handled": outcome.handled(),
        "outcome": outcome,
    })))
}

/// Administrative status override
pub async fn update_session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(payload): Json<StatusUpdateRequest>,
) -> ApiResult<impl IntoResponse> {
    if !is_valid_session_id(&session_id) {
        return Err(ApiError::BadRequest(format!(
            "Invalid session id {:?}",
            session_id
        )));
    }

    state.store.set_status(&session_id, payload.status).await?;
    tracing::info!(
        "Session {} status overridden to {}",
        session_id,
        payload.status
    );

    Ok(Json(json!({
        "session_id": session_id,
        "status": payload.status,
    })))
}
