//! Signed session envelopes.
//!
//! The envelope is an HS256 JWT carrying the session secret as its `jti`.
//! It is deliberately short-lived: once `exp` passes, the underlying session
//! may still be refreshable, so an expired envelope is reported through the
//! `expired` flag instead of an error.

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::clock::Clock;

/// Default envelope lifetime: 1 minute
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(60);

/// Clock skew tolerated on `nbf` between nodes sharing a secret.
pub const NOT_BEFORE_LEEWAY: Duration = Duration::from_secs(60);

/// Claims carried by a session envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Token ID (the raw session secret)
    pub jti: String,
    /// Issuer (public base URL of the deployment)
    pub iss: String,
    /// Subject (user ID as a decimal string)
    pub sub: String,
    /// Audience (same as issuer)
    pub aud: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Not before (Unix timestamp)
    pub nbf: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

/// A freshly signed envelope.
#[derive(Debug, Clone)]
pub struct SignedToken {
    /// The serialized JWT
    pub token: String,
    /// Issued at timestamp (Unix seconds)
    pub issued_at: i64,
    /// Envelope expiration timestamp (Unix seconds)
    pub expires_at: i64,
}

/// Decoded contents of an envelope whose signature checked out.
#[derive(Clone)]
pub struct VerifiedToken {
    pub token_id: String,
    pub user_id: i64,
    pub issued_at: i64,
    pub expires_at: i64,
    /// True when `exp` has passed. The session itself may still be alive.
    pub expired: bool,
}

impl std::fmt::Debug for VerifiedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifiedToken")
            .field("token_id", &"[redacted]")
            .field("user_id", &self.user_id)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("expired", &self.expired)
            .finish()
    }
}

/// Signs and verifies session envelopes with a shared symmetric secret.
#[derive(Clone)]
pub struct TokenSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    audience: String,
    token_lifetime: i64,
    clock: Arc<dyn Clock>,
}

impl TokenSigner {
    /// Create a signer for the deployment reachable at `base_url`.
    pub fn new(
        secret: &[u8],
        base_url: &Url,
        token_lifetime: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            audience: base_url.as_str().to_string(),
            token_lifetime: i64::try_from(token_lifetime.as_secs()).unwrap_or(i64::MAX),
            clock,
        }
    }

    /// Sign an envelope for `token_id`.
    ///
    /// `issued_at` anchors the session soft-expiry window; `nbf` and `exp`
    /// are always computed from the current time.
    pub fn sign(
        &self,
        token_id: &str,
        user_id: i64,
        issued_at: i64,
    ) -> Result<SignedToken, SignerError> {
        if token_id.is_empty() {
            return Err(SignerError::Malformed);
        }
        if user_id <= 0 {
            return Err(SignerError::InvalidSubject);
        }

        let now = self.clock.now();
        let exp = now.saturating_add(self.token_lifetime);

        let claims = SessionClaims {
            jti: token_id.to_string(),
            iss: self.audience.clone(),
            sub: user_id.to_string(),
            aud: self.audience.clone(),
            iat: issued_at,
            nbf: now,
            exp,
        };

        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(SignerError::Encoding)?;

        tracing::debug!(user_id, iat = issued_at, exp, "Issued session envelope");

        Ok(SignedToken {
            token,
            issued_at,
            expires_at: exp,
        })
    }

    /// Check the signature, issuer and audience of an envelope and decode it.
    pub fn verify(&self, token: &str) -> Result<VerifiedToken, SignerError> {
        if token.is_empty() {
            return Err(SignerError::Malformed);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        // Time checks run against the injected clock below.
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.set_issuer(&[self.audience.as_str()]);
        validation.set_audience(&[self.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "aud", "sub"]);

        let claims = jsonwebtoken::decode::<SessionClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    SignerError::InvalidSignature
                }
                ErrorKind::InvalidIssuer | ErrorKind::InvalidAudience => SignerError::InvalidIssuer,
                _ => SignerError::Malformed,
            })?
            .claims;

        if claims.jti.is_empty() {
            return Err(SignerError::Malformed);
        }

        let user_id: i64 = claims
            .sub
            .parse()
            .map_err(|_| SignerError::InvalidSubject)?;
        if user_id <= 0 {
            return Err(SignerError::InvalidSubject);
        }

        let now = self.clock.now();
        if now.saturating_add(NOT_BEFORE_LEEWAY.as_secs() as i64) < claims.nbf {
            return Err(SignerError::NotYetValid);
        }

        Ok(VerifiedToken {
            token_id: claims.jti,
            user_id,
            issued_at: claims.iat,
            expires_at: claims.exp,
            expired: now > claims.exp,
        })
    }
}

/// Errors that can occur while signing or verifying envelopes.
#[derive(Debug)]
pub enum SignerError {
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// Not a decodable envelope
    Malformed,
    /// Signature or algorithm does not match
    InvalidSignature,
    /// Minted for a different deployment
    InvalidIssuer,
    /// Subject is not a positive integer
    InvalidSubject,
    /// `nbf` is in the future
    NotYetValid,
}

impl std::fmt::Display for SignerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignerError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            SignerError::Malformed => write!(f, "Malformed token"),
            SignerError::InvalidSignature => write!(f, "Invalid token signature"),
            SignerError::InvalidIssuer => write!(f, "Token issued for another deployment"),
            SignerError::InvalidSubject => write!(f, "Invalid user id in subject claim"),
            SignerError::NotYetValid => write!(f, "Token not yet valid"),
        }
    }
}

impl std::error::Error for SignerError {}
