//! Session API handlers.

use super::ApiError;
use crate::server::{PairRelay, RelayMetrics};
use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, Path, Query};
use axum::http::StatusCode;
use axum::{Extension, Json};
use pair_core::{assertion_message, PairingCode};
use pair_types::{Session, SessionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;

/// `POST /api/sessions` body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    /// Host public key to embed in the pairing code.
    pub host_public_key: String,
    /// Requested lifetime; the configured default when absent.
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

/// `POST /api/sessions` response: the record plus its pairing code.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedSession {
    /// The stored session.
    #[serde(flatten)]
    pub session: Session,
    /// Pairing code as a query string.
    pub pairing_code: String,
    /// Full scan URL when `server.public_url` is configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pairing_url: Option<String>,
}

/// `DELETE /api/sessions/:id` query.
#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    /// Signature from the creation response.
    pub signature: Option<String>,
}

/// `POST /api/sessions/verify` body.
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    /// Pairing code as scanned: a query string or a full URL.
    pub code: String,
}

/// `POST /api/sessions/verify` response.
#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    /// Always true; failures are errors.
    pub valid: bool,
    /// The live session the code refers to.
    pub session: Session,
}

/// `POST /api/sessions/:id/candidates` response.
#[derive(Debug, Serialize)]
pub struct CandidateAdded {
    /// Candidates stored for the session so far.
    pub count: usize,
}

fn parse_id(id: String) -> Result<SessionId, ApiError> {
    SessionId::parse(id).map_err(|e| ApiError::BadRequest(e.to_string()))
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

/// Create a session and return its pairing code.
pub async fn create_session(
    Extension(relay): Extension<Arc<PairRelay>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    payload: Result<Json<CreateSessionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreatedSession>), ApiError> {
    if let Some(ConnectInfo(addr)) = connect_info {
        if let Err(e) = relay.rate_limits().check_session(addr.ip()) {
            RelayMetrics::incr(&relay.metrics().rate_limit_hits);
            tracing::warn!("Rejected session creation from {}: {}", addr.ip(), e);
            return Err(ApiError::RateLimited(e.to_string()));
        }
    }

    let request = json_body(payload)?;
    if request.ttl_secs == Some(0) {
        return Err(ApiError::BadRequest(
            "ttlSecs must be greater than zero".into(),
        ));
    }

    let config = relay.config();
    let ttl = config.sessions.resolve_ttl(request.ttl_secs);
    let session = relay
        .store()
        .create(SessionId::generate(), request.host_public_key, ttl)?;
    RelayMetrics::incr(&relay.metrics().sessions_created);

    let code = PairingCode::for_session(&session);
    let pairing_url = config
        .server
        .public_url
        .as_deref()
        .map(|base| code.to_url(base));

    tracing::info!(
        "Created session {} (ttl: {}s)",
        session.id,
        ttl.as_secs()
    );

    Ok((
        StatusCode::CREATED,
        Json(CreatedSession {
            pairing_code: code.to_query(),
            pairing_url,
            session,
        }),
    ))
}

/// Fetch a live session record.
pub async fn get_session(
    Extension(relay): Extension<Arc<PairRelay>>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    let id = parse_id(id)?;
    relay.store().get(&id).map(Json).ok_or(ApiError::NotFound)
}

/// Delete a session. The caller proves it created the session by presenting
/// its signature.
pub async fn delete_session(
    Extension(relay): Extension<Arc<PairRelay>>,
    Path(id): Path<String>,
    Query(params): Query<DeleteParams>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(id)?;
    let session = relay.store().get(&id).ok_or(ApiError::NotFound)?;

    let signature = params
        .signature
        .ok_or_else(|| ApiError::BadRequest("missing signature".into()))?;
    let assertion = assertion_message(&session.id, &session.host_public_key, session.expires_at);
    if !relay.store().signer().verify(&assertion, &signature) {
        tracing::warn!("Rejected delete of session {}: bad signature", id);
        return Err(ApiError::BadRequest("invalid code".into()));
    }

    if !relay.end_session(&id).await {
        // Expired between the lookup and the delete
        return Err(ApiError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Verify a scanned pairing code against the live session.
pub async fn verify_code(
    Extension(relay): Extension<Arc<PairRelay>>,
    payload: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let request = json_body(payload)?;
    match check_code(&relay, &request.code) {
        Ok(session) => {
            RelayMetrics::incr(&relay.metrics().codes_verified);
            tracing::debug!("Verified pairing code for session {}", session.id);
            Ok(Json(VerifyResponse {
                valid: true,
                session,
            }))
        }
        Err(e) => {
            RelayMetrics::incr(&relay.metrics().codes_rejected);
            tracing::warn!("Rejected pairing code: {}", e);
            Err(e)
        }
    }
}

fn check_code(relay: &PairRelay, input: &str) -> Result<Session, ApiError> {
    let store = relay.store();
    let code = PairingCode::from_query(input)?;
    code.verify(store.signer(), store.now_ms())?;

    let session = store.get(&code.session_id).ok_or(ApiError::NotFound)?;
    // A valid signature over a superseded host key is stale
    if session.host_public_key != code.host_public_key || session.expires_at != code.expires_at {
        return Err(ApiError::BadRequest("invalid code".into()));
    }
    Ok(session)
}

/// Read the current offer.
pub async fn get_offer(
    Extension(relay): Extension<Arc<PairRelay>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(id)?;
    relay
        .store()
        .offer(&id)?
        .map(Json)
        .ok_or(ApiError::Unset("offer"))
}

/// Replace the current offer.
pub async fn put_offer(
    Extension(relay): Extension<Arc<PairRelay>>,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(id)?;
    relay.store().set_offer(&id, json_body(payload)?)?;
    tracing::debug!("Stored offer for session {}", id);
    Ok(StatusCode::NO_CONTENT)
}

/// Read the current answer.
pub async fn get_answer(
    Extension(relay): Extension<Arc<PairRelay>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(id)?;
    relay
        .store()
        .answer(&id)?
        .map(Json)
        .ok_or(ApiError::Unset("answer"))
}

/// Replace the current answer.
pub async fn put_answer(
    Extension(relay): Extension<Arc<PairRelay>>,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(id)?;
    relay.store().set_answer(&id, json_body(payload)?)?;
    tracing::debug!("Stored answer for session {}", id);
    Ok(StatusCode::NO_CONTENT)
}

/// Append an ICE candidate.
pub async fn add_candidate(
    Extension(relay): Extension<Arc<PairRelay>>,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<CandidateAdded>), ApiError> {
    let id = parse_id(id)?;
    let count = relay.store().add_ice_candidate(&id, json_body(payload)?)?;
    Ok((StatusCode::CREATED, Json(CandidateAdded { count })))
}

/// List ICE candidates in arrival order.
pub async fn list_candidates(
    Extension(relay): Extension<Arc<PairRelay>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Value>>, ApiError> {
    let id = parse_id(id)?;
    Ok(Json(relay.store().ice_candidates(&id)?))
}
