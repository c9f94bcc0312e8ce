//! Rotating login sessions.

mod config;
mod engine;
mod errors;
mod ip;
mod secret;

pub use config::{
    DEFAULT_MAX_SESSION_AGE, DEFAULT_SESSION_LIFETIME, PREVIOUS_TOKEN_GRACE, ROTATION_SAFEGUARD,
    SessionCheckMode, SessionConfig,
};
pub use engine::SessionEngine;
pub use errors::SessionError;
pub use ip::normalize_client_ip;
pub use secret::{derive_token, generate_secret};

use crate::db::Session;
use crate::jwt::SignedToken;

/// Identity carried by a valid (or refreshable) envelope.
#[derive(Clone)]
pub struct SessionIdentity {
    /// Raw session secret. Never log this.
    pub token_id: String,
    pub user_id: i64,
    pub issued_at: i64,
    pub expires_at: i64,
}

impl std::fmt::Debug for SessionIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionIdentity")
            .field("user_id", &self.user_id)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// A freshly created session and the envelope to hand to the client.
#[derive(Debug)]
pub struct IssuedSession {
    pub session: Session,
    pub token: SignedToken,
}

/// Result of a refresh attempt.
#[derive(Debug)]
pub struct RefreshOutcome {
    /// Session row as it stands after the attempt
    pub session: Session,
    /// New envelope, present only when this call rotated the session
    pub token: Option<SignedToken>,
}

impl RefreshOutcome {
    pub fn refreshed(&self) -> bool {
        self.token.is_some()
    }
}
