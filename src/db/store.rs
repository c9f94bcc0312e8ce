//! Session storage contract.
//!
//! Every mutation of an existing row goes through [`SessionStore::conditional_update`]:
//! the write happens only if the row still satisfies an [`UpdateGuard`], and
//! the caller learns whether it did from the affected-row count. Zero rows is
//! not an error, it means another request got there first.

use async_trait::async_trait;

use super::session::{NewSession, Session};

/// Predicate a row must still satisfy for a conditional update to apply.
///
/// Every guard is combined with `id = ?`, so at most one row is affected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateGuard {
    /// `prev_auth_token = ? AND rotated_at < ?`
    PreviousToken {
        prev_auth_token: String,
        rotated_before: i64,
    },
    /// `auth_token = ?`
    CurrentToken { auth_token: String },
    /// `auth_token_seen = 1 OR rotated_at < ?`
    SeenOrRotatedBefore { rotated_before: i64 },
}

impl UpdateGuard {
    /// Evaluate the guard against a row held in memory.
    pub fn matches(&self, row: &Session) -> bool {
        match self {
            UpdateGuard::PreviousToken {
                prev_auth_token,
                rotated_before,
            } => row.prev_auth_token == *prev_auth_token && row.rotated_at < *rotated_before,
            UpdateGuard::CurrentToken { auth_token } => row.auth_token == *auth_token,
            UpdateGuard::SeenOrRotatedBefore { rotated_before } => {
                row.auth_token_seen || row.rotated_at < *rotated_before
            }
        }
    }
}

/// Persistence for session rows.
///
/// Implementations:
/// - [`SqliteSessionStore`](super::SqliteSessionStore): the `user_sessions` table
/// - [`MemorySessionStore`](super::MemorySessionStore): a mutex-guarded map for tests
///   and single-instance deployments
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a new row and return its ID.
    ///
    /// Fails with [`StoreError::Conflict`] if either token is already owned
    /// by another row.
    async fn insert(&self, session: &NewSession) -> Result<i64, StoreError>;

    /// Find the row whose current or previous token equals `token`.
    async fn find_by_either_token(&self, token: &str) -> Result<Option<Session>, StoreError>;

    /// Find a row by ID.
    async fn find_by_id(&self, id: i64) -> Result<Option<Session>, StoreError>;

    /// Overwrite the mutable columns of row `id` with `values` if `guard` holds.
    ///
    /// Returns the number of affected rows (0 or 1).
    async fn conditional_update(
        &self,
        id: i64,
        guard: &UpdateGuard,
        values: &Session,
    ) -> Result<u64, StoreError>;

    /// List a user's sessions, most recently rotated first.
    async fn list_by_user(&self, user_id: i64) -> Result<Vec<Session>, StoreError>;

    /// Delete the row owning `token` as current or previous token.
    async fn delete_by_token(&self, token: &str) -> Result<bool, StoreError>;

    /// Delete row `id` if it belongs to `user_id`.
    async fn delete_by_id(&self, user_id: i64, id: i64) -> Result<bool, StoreError>;

    /// Delete all rows for a user.
    async fn delete_by_user(&self, user_id: i64) -> Result<u64, StoreError>;

    /// Delete rows whose `rotated_at` is older than `cutoff`.
    async fn delete_rotated_before(&self, cutoff: i64) -> Result<u64, StoreError>;
}

/// Errors returned by session stores.
#[derive(Debug)]
pub enum StoreError {
    /// Unique constraint violation on `auth_token` or `prev_auth_token`
    Conflict,
    /// Underlying database error
    Database(sqlx::Error),
    /// In-memory store lock poisoned
    Poisoned,
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict,
            _ => StoreError::Database(e),
        }
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Conflict => write!(f, "Session token already exists"),
            StoreError::Database(e) => write!(f, "Database error: {}", e),
            StoreError::Poisoned => write!(f, "Session store lock poisoned"),
        }
    }
}

impl std::error::Error for StoreError {}
