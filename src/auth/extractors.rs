//! Axum extractor and response layer for session authentication.

use std::cell::RefCell;

use axum::{
    extract::{FromRequestParts, Request},
    http::{HeaderValue, header, request::Parts},
    middleware::Next,
    response::Response,
};
use tracing::{debug, error};

use super::cookie::{SESSION_COOKIE_NAME, get_cookie, session_cookie};
use super::errors::{ApiAuthError, AuthErrorKind};
use super::ip::extract_client_ip;
use super::state::HasSessionEngine;
use super::types::AuthenticatedSession;
use crate::session::{SessionError, SessionIdentity};

tokio::task_local! {
    /// Task-local storage for the rotated session cookie.
    /// Used to pass the cookie from the auth extractor to the response middleware.
    pub static NEW_SESSION_COOKIE: RefCell<Option<String>>;
}

/// Middleware that appends the cookie set by [`SessionAuth`] after a rotation.
pub async fn add_session_cookie(request: Request, next: Next) -> Response {
    NEW_SESSION_COOKIE
        .scope(RefCell::new(None), async move {
            let mut response = next.run(request).await;
            let cookie = NEW_SESSION_COOKIE.with(|cell| cell.borrow_mut().take());
            if let Some(cookie) = cookie {
                if let Ok(value) = HeaderValue::from_str(&cookie) {
                    response.headers_mut().append(header::SET_COOKIE, value);
                }
            }
            response
        })
        .await
}

/// Drop a rotated cookie queued by the extractor, for handlers that end the
/// session themselves.
pub fn discard_new_session_cookie() {
    let _ = NEW_SESSION_COOKIE.try_with(|cell| cell.borrow_mut().take());
}

/// Validate the session cookie, refreshing the session when the envelope
/// has expired.
async fn authenticate_request<S>(
    parts: &Parts,
    state: &S,
) -> Result<AuthenticatedSession, ApiAuthError>
where
    S: HasSessionEngine + Send + Sync,
{
    let cookies = state.cookies();
    let engine = state.engine();

    let token = get_cookie(&parts.headers, SESSION_COOKIE_NAME)
        .ok_or_else(|| ApiAuthError::new(AuthErrorKind::NotAuthenticated, cookies.secure))?;

    let identity = match engine.validate(token).await {
        Ok(identity) => {
            return Ok(AuthenticatedSession {
                identity,
                rotated: false,
            });
        }
        Err(SessionError::SessionTokenExpired(identity)) => identity,
        Err(e) => return Err(ApiAuthError::from_session_error(e, cookies.secure)),
    };

    let client_ip = extract_client_ip(parts, state.ip_header()).map_err(|e| {
        debug!(error = e, "Cannot refresh session without client IP");
        ApiAuthError::new(AuthErrorKind::ClientIpUnavailable, cookies.secure)
    })?;
    let user_agent = parts
        .headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let outcome = engine
        .refresh_session(&identity.token_id, identity.user_id, &client_ip, user_agent)
        .await
        .map_err(|e| ApiAuthError::from_session_error(e, cookies.secure))?;

    let Some(token) = outcome.token else {
        // Another request rotated the session moments ago; the client keeps
        // its cookie until the new one arrives.
        return Ok(AuthenticatedSession {
            identity,
            rotated: false,
        });
    };

    // Parse the new envelope to get its identity
    let verified = engine.signer().verify(&token.token).map_err(|e| {
        error!(error = %e, "Failed to read back rotated session token");
        ApiAuthError::new(AuthErrorKind::Internal, cookies.secure)
    })?;

    let new_cookie = session_cookie(&token.token, cookies.max_age.as_secs(), cookies.secure);
    let _ = NEW_SESSION_COOKIE.try_with(|cell| {
        cell.borrow_mut().replace(new_cookie);
    });

    Ok(AuthenticatedSession {
        identity: SessionIdentity {
            token_id: verified.token_id,
            user_id: verified.user_id,
            issued_at: verified.issued_at,
            expires_at: verified.expires_at,
        },
        rotated: true,
    })
}

/// Extractor for API endpoints that require a session.
/// Validates the envelope and transparently refreshes it once expired.
/// Returns JSON errors and clears the cookie when the session is gone.
pub struct SessionAuth(pub AuthenticatedSession);

impl<S> FromRequestParts<S> for SessionAuth
where
    S: HasSessionEngine + Send + Sync,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        authenticate_request(parts, state).await.map(SessionAuth)
    }
}
