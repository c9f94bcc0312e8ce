//! Authentication user types.

use crate::session::SessionIdentity;

/// Session that authenticated the current request.
#[derive(Debug, Clone)]
pub struct AuthenticatedSession {
    /// Identity from the envelope the client holds after this request
    pub identity: SessionIdentity,
    /// Whether this request rotated the session
    pub rotated: bool,
}

impl AuthenticatedSession {
    pub fn user_id(&self) -> i64 {
        self.identity.user_id
    }

    pub fn token_id(&self) -> &str {
        &self.identity.token_id
    }
}
