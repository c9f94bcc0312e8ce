//! Session lifecycle: create, validate, refresh and revoke.
//!
//! A client holds a short-lived signed envelope around a session secret. The
//! envelope is checked without touching the store; once it expires the
//! session row is rotated to a new secret. Rotation tolerates concurrent
//! requests from the same browser through three pieces of row state: the
//! previous token, the seen flag, and the rotation time. Every write is a
//! conditional update, and losing a race is never an error.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use url::Url;

use crate::clock::Clock;
use crate::db::{NewSession, Session, SessionStore, UpdateGuard};
use crate::jwt::TokenSigner;

use super::config::{SessionCheckMode, SessionConfig};
use super::errors::SessionError;
use super::ip::normalize_client_ip;
use super::secret::{derive_token, generate_secret};
use super::{IssuedSession, RefreshOutcome, SessionIdentity};

#[derive(Clone)]
pub struct SessionEngine {
    store: Arc<dyn SessionStore>,
    signer: TokenSigner,
    clock: Arc<dyn Clock>,
    token_key: Arc<[u8]>,
    config: SessionConfig,
}

fn secs(d: Duration) -> i64 {
    i64::try_from(d.as_secs()).unwrap_or(i64::MAX)
}

impl SessionEngine {
    /// Create an engine signing envelopes for `base_url` with `secret`.
    ///
    /// The same secret keys the derivation of stored token values.
    pub fn new(
        store: Arc<dyn SessionStore>,
        secret: &[u8],
        base_url: &Url,
        config: SessionConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let signer = TokenSigner::new(secret, base_url, config.token_lifetime, clock.clone());
        Self {
            store,
            signer,
            clock,
            token_key: Arc::from(secret),
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    /// Whether `token_id` is the current or previous token of `session`.
    pub fn owns_token(&self, session: &Session, token_id: &str) -> bool {
        let derived = derive_token(&self.token_key, token_id);
        session.auth_token == derived || session.prev_auth_token == derived
    }

    /// Start a session for a user who just authenticated.
    ///
    /// A [`SessionError::Conflict`] means the generated secret collided with
    /// an existing one; calling again draws a fresh secret.
    pub async fn create_session(
        &self,
        user_id: i64,
        client_ip: &str,
        user_agent: &str,
    ) -> Result<IssuedSession, SessionError> {
        if user_id <= 0 {
            return Err(SessionError::InvalidUserId(user_id));
        }

        let secret = generate_secret();
        let hashed = derive_token(&self.token_key, &secret);
        let now = self.clock.now();

        let new_session = NewSession {
            user_id,
            auth_token: hashed.clone(),
            prev_auth_token: hashed,
            client_ip: normalize_client_ip(client_ip).unwrap_or_default(),
            user_agent: user_agent.to_string(),
            created_at: now,
        };

        let id = self.store.insert(&new_session).await?;
        let session = new_session.into_session(id);

        let token = self
            .signer
            .sign(&secret, user_id, now)
            .map_err(SessionError::Signing)?;

        info!(session_id = id, user_id, "Created session");

        Ok(IssuedSession { session, token })
    }

    /// Check a presented envelope.
    ///
    /// An unexpired envelope is accepted on its signature alone (unless the
    /// check mode is [`SessionCheckMode::Always`]). An expired one yields
    /// [`SessionError::SessionTokenExpired`] while the session is still within
    /// its lifetime, and [`SessionError::SessionExpired`] after.
    pub async fn validate(&self, serialized: &str) -> Result<SessionIdentity, SessionError> {
        let verified = self.signer.verify(serialized).map_err(|e| {
            debug!(error = %e, "Rejected session token");
            SessionError::InvalidSession(e)
        })?;

        let expired = verified.expired;
        let identity = SessionIdentity {
            token_id: verified.token_id,
            user_id: verified.user_id,
            issued_at: verified.issued_at,
            expires_at: verified.expires_at,
        };

        if expired {
            let session_expiration = identity
                .issued_at
                .saturating_add(secs(self.config.session_lifetime));
            if self.clock.now() > session_expiration {
                debug!(
                    user_id = identity.user_id,
                    session_exp = session_expiration,
                    "Session expired"
                );
                return Err(SessionError::SessionExpired);
            }

            debug!(user_id = identity.user_id, "Session token expired");
            return Err(SessionError::SessionTokenExpired(identity));
        }

        if self.config.check_mode == SessionCheckMode::Always {
            match self.lookup_session(&identity.token_id).await? {
                Some(session) if session.user_id == identity.user_id => {}
                _ => return Err(SessionError::SessionNotFound),
            }
        }

        Ok(identity)
    }

    /// Rotate the session behind an expired envelope.
    ///
    /// Returns a new envelope when the rotation happened. When another
    /// request rotated the session moments ago the outcome carries no token:
    /// the request should still succeed, the client just keeps its cookie.
    pub async fn refresh_session(
        &self,
        token_id: &str,
        user_id: i64,
        client_ip: &str,
        user_agent: &str,
    ) -> Result<RefreshOutcome, SessionError> {
        let presented = derive_token(&self.token_key, token_id);

        let Some(mut session) = self.store.find_by_either_token(&presented).await? else {
            debug!(user_id, "Session not found for presented token");
            return Err(SessionError::SessionNotFound);
        };

        if session.user_id != user_id {
            warn!(
                session_id = session.id,
                user_id, "Session token presented for a different user"
            );
            return Err(SessionError::SessionNotFound);
        }

        let now = self.clock.now();

        // The previous token came back after the client already used the
        // current one. Let the current token be rotated again once the last
        // rotation is old enough.
        if session.auth_token != presented
            && session.prev_auth_token == presented
            && session.auth_token_seen
        {
            let mut unseen = session.clone();
            unseen.auth_token_seen = false;

            let guard = UpdateGuard::PreviousToken {
                prev_auth_token: session.prev_auth_token.clone(),
                rotated_before: now.saturating_sub(secs(self.config.previous_token_grace)),
            };
            let affected = self
                .store
                .conditional_update(session.id, &guard, &unseen)
                .await?;

            if affected == 1 {
                info!(
                    session_id = session.id,
                    user_id, "Previous token presented after rotation, current token reset to unseen"
                );
                session = unseen;
            } else {
                debug!(
                    session_id = session.id,
                    user_id, "Previous token presented, session unchanged"
                );
            }
        }

        if !session.auth_token_seen && session.auth_token == presented {
            let mut seen = session.clone();
            seen.auth_token_seen = true;
            seen.seen_at = now;

            let guard = UpdateGuard::CurrentToken {
                auth_token: session.auth_token.clone(),
            };
            let affected = self
                .store
                .conditional_update(session.id, &guard, &seen)
                .await?;

            if affected == 1 {
                debug!(session_id = session.id, user_id, "Marked session token seen");
                session = seen;
            } else {
                debug!(
                    session_id = session.id,
                    user_id, "Session token changed before it could be marked seen"
                );
            }
        }

        let secret = generate_secret();

        let mut rotated = session.clone();
        if rotated.auth_token_seen {
            rotated.prev_auth_token = rotated.auth_token.clone();
        }
        rotated.auth_token = derive_token(&self.token_key, &secret);
        rotated.auth_token_seen = false;
        rotated.seen_at = 0;
        rotated.client_ip = normalize_client_ip(client_ip).unwrap_or_default();
        rotated.user_agent = user_agent.to_string();
        rotated.rotated_at = now.max(session.rotated_at);
        rotated.updated_at = now.max(session.updated_at);

        let guard = UpdateGuard::SeenOrRotatedBefore {
            rotated_before: now.saturating_sub(secs(self.config.rotation_safeguard)),
        };
        let affected = self
            .store
            .conditional_update(session.id, &guard, &rotated)
            .await?;

        if affected == 0 {
            debug!(
                session_id = session.id,
                user_id, "Session rotated recently, keeping current token"
            );
            return Ok(RefreshOutcome {
                session,
                token: None,
            });
        }

        let token = self
            .signer
            .sign(&secret, user_id, now)
            .map_err(SessionError::Signing)?;

        info!(session_id = rotated.id, user_id, "Rotated session token");

        Ok(RefreshOutcome {
            session: rotated,
            token: Some(token),
        })
    }

    /// Find the row a presented token belongs to.
    pub async fn lookup_session(&self, token_id: &str) -> Result<Option<Session>, SessionError> {
        let derived = derive_token(&self.token_key, token_id);
        Ok(self.store.find_by_either_token(&derived).await?)
    }

    /// Log out: delete the session owning `token_id`.
    pub async fn revoke_session(&self, token_id: &str) -> Result<bool, SessionError> {
        let derived = derive_token(&self.token_key, token_id);
        let revoked = self.store.delete_by_token(&derived).await?;
        if revoked {
            info!("Revoked session");
        }
        Ok(revoked)
    }

    /// Delete one of a user's sessions by ID.
    pub async fn revoke_session_by_id(
        &self,
        user_id: i64,
        session_id: i64,
    ) -> Result<bool, SessionError> {
        let revoked = self.store.delete_by_id(user_id, session_id).await?;
        if revoked {
            info!(session_id, user_id, "Revoked session");
        }
        Ok(revoked)
    }

    /// Delete every session of a user.
    pub async fn revoke_user_sessions(&self, user_id: i64) -> Result<u64, SessionError> {
        let count = self.store.delete_by_user(user_id).await?;
        info!(user_id, count, "Revoked all sessions for user");
        Ok(count)
    }

    pub async fn list_user_sessions(&self, user_id: i64) -> Result<Vec<Session>, SessionError> {
        Ok(self.store.list_by_user(user_id).await?)
    }

    /// Delete sessions not rotated within `max_age`.
    pub async fn reap_expired(&self, max_age: Duration) -> Result<u64, SessionError> {
        let cutoff = self.clock.now().saturating_sub(secs(max_age));
        Ok(self.store.delete_rotated_before(cutoff).await?)
    }
}
