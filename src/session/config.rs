//! Session lifetimes and protocol windows.

use std::time::Duration;

use crate::jwt::DEFAULT_TOKEN_LIFETIME;

/// Default session lifetime measured from the envelope's `iat`: 10 minutes
pub const DEFAULT_SESSION_LIFETIME: Duration = Duration::from_secs(10 * 60);

/// Minimum time between two rotations of an unseen token: 90 seconds
pub const ROTATION_SAFEGUARD: Duration = Duration::from_secs(90);

/// Minimum age of a rotation before a stale previous token may reset the
/// current token's seen flag: 2 minutes
pub const PREVIOUS_TOKEN_GRACE: Duration = Duration::from_secs(2 * 60);

/// Default absolute ceiling on session age before the reaper deletes it: 30 days
pub const DEFAULT_MAX_SESSION_AGE: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// How much work `validate` does for an envelope that has not expired.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionCheckMode {
    /// Trust the signature until the envelope expires. No store access.
    #[default]
    OnExpiry,
    /// Also confirm the session row still exists on every request, so
    /// revocation takes effect immediately at the cost of a lookup.
    Always,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Lifetime of a signed envelope
    pub token_lifetime: Duration,
    /// How long after `iat` an expired envelope can still be refreshed
    pub session_lifetime: Duration,
    pub rotation_safeguard: Duration,
    pub previous_token_grace: Duration,
    /// Rows not rotated for this long are deleted by the reaper
    pub max_session_age: Duration,
    pub check_mode: SessionCheckMode,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            token_lifetime: DEFAULT_TOKEN_LIFETIME,
            session_lifetime: DEFAULT_SESSION_LIFETIME,
            rotation_safeguard: ROTATION_SAFEGUARD,
            previous_token_grace: PREVIOUS_TOKEN_GRACE,
            max_session_age: DEFAULT_MAX_SESSION_AGE,
            check_mode: SessionCheckMode::OnExpiry,
        }
    }
}
