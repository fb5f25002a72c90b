//! HTTP endpoints for pairlink-relay.
//!
//! Provides the session API, the WebSocket relay, health checks, and metrics.

pub mod health;
mod metrics;
pub mod sessions;

use crate::error::StoreError;
use crate::server::PairRelay;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use pair_core::PairingError;
use std::sync::Arc;

pub use health::HealthStatus;

/// Build the HTTP router with all endpoints.
pub fn build_router(relay: Arc<PairRelay>) -> Router {
    let mut router = Router::new()
        .route("/health", get(health::health_handler))
        .route("/ws", get(crate::connection::ws_handler))
        .route("/api/sessions", post(sessions::create_session))
        .route("/api/sessions/verify", post(sessions::verify_code))
        .route(
            "/api/sessions/:id",
            get(sessions::get_session).delete(sessions::delete_session),
        )
        .route(
            "/api/sessions/:id/offer",
            get(sessions::get_offer).put(sessions::put_offer),
        )
        .route(
            "/api/sessions/:id/answer",
            get(sessions::get_answer).put(sessions::put_answer),
        )
        .route(
            "/api/sessions/:id/candidates",
            get(sessions::list_candidates).post(sessions::add_candidate),
        );

    if relay.config().server.metrics_enabled {
        router = router.route("/metrics", get(metrics::metrics_handler));
    }

    router.layer(Extension(relay))
}

/// Errors returned by the HTTP API as `{"error": "..."}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed request or rejected input.
    #[error("{0}")]
    BadRequest(String),

    /// Session absent or expired.
    #[error("session not found or expired")]
    NotFound,

    /// A signaling blob has not been posted yet.
    #[error("no {0} yet")]
    Unset(&'static str),

    /// Rate limit exceeded.
    #[error("{0}")]
    RateLimited(String),

    /// Anything the client cannot fix. Details are logged, not returned.
    #[error("internal error")]
    Internal,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound | ApiError::Unset(_) => StatusCode::NOT_FOUND,
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => ApiError::NotFound,
            // Ids are generated server-side, so a collision is not the client's fault
            StoreError::AlreadyExists { id } => {
                tracing::error!("Session id {} collided with a live session", id);
                ApiError::Internal
            }
            StoreError::InvalidInput { reason } => ApiError::BadRequest(reason),
            StoreError::CandidateLimit { .. } => ApiError::BadRequest(e.to_string()),
        }
    }
}

impl From<PairingError> for ApiError {
    fn from(e: PairingError) -> Self {
        match e {
            // Expired and missing sessions look the same to clients
            PairingError::Expired => ApiError::NotFound,
            _ => ApiError::BadRequest(e.to_string()),
        }
    }
}
