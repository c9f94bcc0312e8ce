//! Session lifecycle error types.

use crate::db::StoreError;
use crate::jwt::SignerError;

use super::SessionIdentity;

/// Errors returned by [`SessionEngine`](super::SessionEngine).
#[derive(Debug)]
pub enum SessionError {
    /// Envelope is malformed, forged, or minted elsewhere
    InvalidSession(SignerError),
    /// Presented token is unknown or revoked
    SessionNotFound,
    /// Session outlived its lifetime
    SessionExpired,
    /// Envelope expired but the session can still be refreshed
    SessionTokenExpired(SessionIdentity),
    /// User ID is not positive
    InvalidUserId(i64),
    /// Generated token collided with an existing one; retry
    Conflict,
    /// Failed to sign a new envelope
    Signing(SignerError),
    /// Storage failure
    Persistence(StoreError),
}

impl SessionError {
    /// Errors after which the client must drop its cookie and log in again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionError::InvalidSession(_)
                | SessionError::SessionNotFound
                | SessionError::SessionExpired
        )
    }

    /// Errors the caller resolves by refreshing the session.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SessionError::SessionTokenExpired(_))
    }
}

impl From<StoreError> for SessionError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict => SessionError::Conflict,
            other => SessionError::Persistence(other),
        }
    }
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::InvalidSession(e) => write!(f, "Invalid session token: {}", e),
            SessionError::SessionNotFound => write!(f, "User session not found"),
            SessionError::SessionExpired => write!(f, "User session expired"),
            SessionError::SessionTokenExpired(_) => write!(f, "User session token expired"),
            SessionError::InvalidUserId(id) => write!(f, "Invalid user id: {}", id),
            SessionError::Conflict => write!(f, "Session token collision"),
            SessionError::Signing(e) => write!(f, "Failed to sign session token: {}", e),
            SessionError::Persistence(e) => write!(f, "Session store error: {}", e),
        }
    }
}

impl std::error::Error for SessionError {}
