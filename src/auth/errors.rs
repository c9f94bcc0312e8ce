//! Authentication error types.

use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::error;

use super::cookie::clear_session_cookie;
use crate::session::SessionError;

/// Why a request failed to authenticate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// No session cookie on the request
    NotAuthenticated,
    InvalidSession,
    SessionNotFound,
    SessionExpired,
    /// The configured client IP header is missing or unreadable
    ClientIpUnavailable,
    Internal,
}

impl AuthErrorKind {
    /// Kinds after which the session cookie is worthless.
    pub fn clears_cookie(self) -> bool {
        matches!(
            self,
            AuthErrorKind::InvalidSession
                | AuthErrorKind::SessionNotFound
                | AuthErrorKind::SessionExpired
        )
    }
}

/// API authentication errors (returns JSON and clears the cookie when the
/// session is gone).
#[derive(Debug)]
pub struct ApiAuthError {
    kind: AuthErrorKind,
    secure_cookies: bool,
}

impl ApiAuthError {
    pub fn new(kind: AuthErrorKind, secure_cookies: bool) -> Self {
        Self {
            kind,
            secure_cookies,
        }
    }

    /// Map an engine error. Storage and signing failures are logged here.
    pub fn from_session_error(e: SessionError, secure_cookies: bool) -> Self {
        let kind = match e {
            SessionError::InvalidSession(_) => AuthErrorKind::InvalidSession,
            SessionError::SessionNotFound => AuthErrorKind::SessionNotFound,
            SessionError::SessionExpired => AuthErrorKind::SessionExpired,
            other => {
                error!(error = %other, "Session check failed");
                AuthErrorKind::Internal
            }
        };
        Self::new(kind, secure_cookies)
    }

    fn status_code(&self) -> StatusCode {
        match self.kind {
            AuthErrorKind::NotAuthenticated
            | AuthErrorKind::InvalidSession
            | AuthErrorKind::SessionNotFound
            | AuthErrorKind::SessionExpired => StatusCode::UNAUTHORIZED,
            AuthErrorKind::ClientIpUnavailable => StatusCode::BAD_REQUEST,
            AuthErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &'static str {
        match self.kind {
            AuthErrorKind::NotAuthenticated => "Not authenticated",
            AuthErrorKind::InvalidSession => "Invalid session",
            AuthErrorKind::SessionNotFound => "Session has been revoked",
            AuthErrorKind::SessionExpired => "Session expired",
            AuthErrorKind::ClientIpUnavailable => "Client IP unavailable",
            AuthErrorKind::Internal => "Internal error",
        }
    }
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        use axum::Json;
        use serde::Serialize;

        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
        }

        let mut response = (
            self.status_code(),
            Json(ErrorResponse {
                error: self.message(),
            }),
        )
            .into_response();

        if self.kind.clears_cookie() {
            if let Ok(value) = HeaderValue::from_str(&clear_session_cookie(self.secure_cookies)) {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
        }

        response
    }
}
