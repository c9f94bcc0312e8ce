//! Session management API endpoints.
//!
//! - GET `/verify` - Check the session cookie (refreshing it when expired)
//! - GET `/` - List the caller's sessions
//! - POST `/logout` - Revoke the presented session and clear the cookie
//! - POST `/logout-all` - Revoke every session of the caller
//! - DELETE `/{id}` - Revoke one of the caller's sessions

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{StatusCode, header::SET_COOKIE},
    response::IntoResponse,
    routing::{delete, get, post},
};
use serde::Serialize;
use tracing::debug;

use super::error::{ApiError, ResultExt};
use crate::auth::{
    CookieSettings, SESSION_COOKIE_NAME, SessionAuth, clear_session_cookie,
    discard_new_session_cookie, get_cookie,
};
use crate::cli::ClientIpHeader;
use crate::impl_has_session_engine;
use crate::session::SessionEngine;

#[derive(Clone)]
pub struct SessionsState {
    pub engine: SessionEngine,
    pub cookies: CookieSettings,
    pub ip_header: Option<ClientIpHeader>,
}

impl_has_session_engine!(SessionsState);

pub fn router(state: SessionsState) -> Router {
    Router::new()
        .route("/", get(list_sessions))
        .route("/verify", get(verify_session))
        .route("/logout", post(logout))
        .route("/logout-all", post(logout_all))
        .route("/{id}", delete(revoke_session))
        .with_state(state)
}

#[derive(Serialize)]
struct VerifyResponse {
    user_id: i64,
    expires_at: i64,
}

#[derive(Serialize)]
struct SessionInfo {
    id: i64,
    client_ip: String,
    user_agent: String,
    created_at: i64,
    rotated_at: i64,
    is_current: bool,
}

#[derive(Serialize)]
struct ListSessionsResponse {
    sessions: Vec<SessionInfo>,
}

#[derive(Serialize)]
struct RevokeResponse {
    revoked: bool,
}

#[derive(Serialize)]
struct RevokeAllResponse {
    revoked: u64,
}

/// Verify that the session cookie is still good.
/// Returns 200 if valid, 401 if not.
async fn verify_session(SessionAuth(auth): SessionAuth) -> impl IntoResponse {
    Json(VerifyResponse {
        user_id: auth.user_id(),
        expires_at: auth.identity.expires_at,
    })
}

/// List all sessions of the current user, most recently rotated first.
async fn list_sessions(
    State(state): State<SessionsState>,
    SessionAuth(auth): SessionAuth,
) -> Result<impl IntoResponse, ApiError> {
    let sessions = state
        .engine
        .list_user_sessions(auth.user_id())
        .await
        .db_err("Failed to list sessions")?;

    let sessions = sessions
        .into_iter()
        .map(|s| SessionInfo {
            is_current: state.engine.owns_token(&s, auth.token_id()),
            id: s.id,
            client_ip: s.client_ip,
            user_agent: s.user_agent,
            created_at: s.created_at,
            rotated_at: s.rotated_at,
        })
        .collect();

    Ok((StatusCode::OK, Json(ListSessionsResponse { sessions })))
}

/// Logout - revoke the presented session and clear the cookie.
/// An expired envelope still identifies its session.
async fn logout(
    State(state): State<SessionsState>,
    request: axum::extract::Request,
) -> Result<impl IntoResponse, ApiError> {
    let (parts, _body) = request.into_parts();

    if let Some(token) = get_cookie(&parts.headers, SESSION_COOKIE_NAME) {
        match state.engine.signer().verify(token) {
            Ok(verified) => {
                state
                    .engine
                    .revoke_session(&verified.token_id)
                    .await
                    .db_err("Failed to revoke session")?;
            }
            Err(e) => debug!(error = %e, "Logout with unreadable session token"),
        }
    }

    Ok((
        StatusCode::OK,
        [(SET_COOKIE, clear_session_cookie(state.cookies.secure))],
        Json(serde_json::json!({ "success": true })),
    ))
}

/// Revoke every session of the current user, this one included.
async fn logout_all(
    State(state): State<SessionsState>,
    SessionAuth(auth): SessionAuth,
) -> Result<impl IntoResponse, ApiError> {
    let revoked = state
        .engine
        .revoke_user_sessions(auth.user_id())
        .await
        .db_err("Failed to revoke sessions")?;

    discard_new_session_cookie();

    Ok((
        StatusCode::OK,
        [(SET_COOKIE, clear_session_cookie(state.cookies.secure))],
        Json(RevokeAllResponse { revoked }),
    ))
}

/// Revoke one session by ID. Users can only revoke their own sessions.
async fn revoke_session(
    State(state): State<SessionsState>,
    SessionAuth(auth): SessionAuth,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let current = state
        .engine
        .lookup_session(auth.token_id())
        .await
        .db_err("Failed to look up session")?;
    let is_current = current.is_some_and(|s| s.id == id);

    let revoked = state
        .engine
        .revoke_session_by_id(auth.user_id(), id)
        .await
        .db_err("Failed to revoke session")?;

    if !revoked {
        return Err(ApiError::not_found("Session not found"));
    }

    if is_current {
        discard_new_session_cookie();
        return Ok((
            StatusCode::OK,
            [(SET_COOKIE, clear_session_cookie(state.cookies.secure))],
            Json(RevokeResponse { revoked }),
        )
            .into_response());
    }

    Ok((StatusCode::OK, Json(RevokeResponse { revoked })).into_response())
}
