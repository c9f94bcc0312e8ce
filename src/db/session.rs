//! Session rows and their SQLite store.
//!
//! One row per logical browser session. The row keeps its ID for its whole
//! life while the token it answers to is rotated.

use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;

use super::store::{SessionStore, StoreError, UpdateGuard};

/// A persisted session.
#[derive(Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Session {
    pub id: i64,
    pub user_id: i64,
    /// Derived value of the current secret
    pub auth_token: String,
    /// Derived value of the previous secret
    pub prev_auth_token: String,
    /// Whether the current token has been presented since the last rotation
    pub auth_token_seen: bool,
    pub seen_at: i64,
    pub rotated_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub client_ip: String,
    pub user_agent: String,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("auth_token_seen", &self.auth_token_seen)
            .field("seen_at", &self.seen_at)
            .field("rotated_at", &self.rotated_at)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .field("client_ip", &self.client_ip)
            .field("user_agent", &self.user_agent)
            .finish_non_exhaustive()
    }
}

/// Values for a row that has not been inserted yet.
#[derive(Clone)]
pub struct NewSession {
    pub user_id: i64,
    pub auth_token: String,
    pub prev_auth_token: String,
    pub client_ip: String,
    pub user_agent: String,
    pub created_at: i64,
}

impl NewSession {
    pub(crate) fn into_session(self, id: i64) -> Session {
        Session {
            id,
            user_id: self.user_id,
            auth_token: self.auth_token,
            prev_auth_token: self.prev_auth_token,
            auth_token_seen: false,
            seen_at: 0,
            rotated_at: self.created_at,
            created_at: self.created_at,
            updated_at: self.created_at,
            client_ip: self.client_ip,
            user_agent: self.user_agent,
        }
    }
}

const SELECT_COLUMNS: &str = "SELECT id, user_id, auth_token, prev_auth_token, auth_token_seen, seen_at, rotated_at, created_at, updated_at, client_ip, user_agent FROM user_sessions";

const UPDATE_COLUMNS: &str = "UPDATE user_sessions SET auth_token = ?, prev_auth_token = ?, auth_token_seen = ?, seen_at = ?, rotated_at = ?, updated_at = ?, client_ip = ?, user_agent = ? WHERE id = ?";

/// Store for session rows backed by SQLite.
#[derive(Clone)]
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn insert(&self, session: &NewSession) -> Result<i64, StoreError> {
        let result = sqlx::query(
            "INSERT INTO user_sessions (user_id, auth_token, prev_auth_token, auth_token_seen, seen_at, rotated_at, created_at, updated_at, client_ip, user_agent)
             VALUES (?, ?, ?, 0, 0, ?, ?, ?, ?, ?)",
        )
        .bind(session.user_id)
        .bind(&session.auth_token)
        .bind(&session.prev_auth_token)
        .bind(session.created_at)
        .bind(session.created_at)
        .bind(session.created_at)
        .bind(&session.client_ip)
        .bind(&session.user_agent)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn find_by_either_token(&self, token: &str) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query_as::<_, Session>(&format!(
            "{} WHERE auth_token = ? OR prev_auth_token = ?",
            SELECT_COLUMNS
        ))
        .bind(token)
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query_as::<_, Session>(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn conditional_update(
        &self,
        id: i64,
        guard: &UpdateGuard,
        values: &Session,
    ) -> Result<u64, StoreError> {
        let predicate = match guard {
            UpdateGuard::PreviousToken { .. } => "prev_auth_token = ? AND rotated_at < ?",
            UpdateGuard::CurrentToken { .. } => "auth_token = ?",
            UpdateGuard::SeenOrRotatedBefore { .. } => "(auth_token_seen = 1 OR rotated_at < ?)",
        };
        let sql = format!("{} AND {}", UPDATE_COLUMNS, predicate);

        let query = sqlx::query(&sql)
            .bind(&values.auth_token)
            .bind(&values.prev_auth_token)
            .bind(values.auth_token_seen)
            .bind(values.seen_at)
            .bind(values.rotated_at)
            .bind(values.updated_at)
            .bind(&values.client_ip)
            .bind(&values.user_agent)
            .bind(id);

        let query = match guard {
            UpdateGuard::PreviousToken {
                prev_auth_token,
                rotated_before,
            } => query.bind(prev_auth_token).bind(*rotated_before),
            UpdateGuard::CurrentToken { auth_token } => query.bind(auth_token),
            UpdateGuard::SeenOrRotatedBefore { rotated_before } => query.bind(*rotated_before),
        };

        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<Session>, StoreError> {
        let rows = sqlx::query_as::<_, Session>(&format!(
            "{} WHERE user_id = ? ORDER BY rotated_at DESC, id DESC",
            SELECT_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn delete_by_token(&self, token: &str) -> Result<bool, StoreError> {
        let result =
            sqlx::query("DELETE FROM user_sessions WHERE auth_token = ? OR prev_auth_token = ?")
                .bind(token)
                .bind(token)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_id(&self, user_id: i64, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM user_sessions WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_user(&self, user_id: i64) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM user_sessions WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_rotated_before(&self, cutoff: i64) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM user_sessions WHERE rotated_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn new_session(user_id: i64, token: &str, now: i64) -> NewSession {
        NewSession {
            user_id,
            auth_token: token.to_string(),
            prev_auth_token: token.to_string(),
            client_ip: "192.168.10.11".to_string(),
            user_agent: "test-agent".to_string(),
            created_at: now,
        }
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let db = Database::open(":memory:").await.unwrap();
        let store = db.sessions();

        let id = store.insert(&new_session(1, "tok-a", 100)).await.unwrap();
        assert!(id > 0);

        let row = store.find_by_either_token("tok-a").await.unwrap().unwrap();
        assert_eq!(row.id, id);
        assert_eq!(row.user_id, 1);
        assert_eq!(row.auth_token, "tok-a");
        assert_eq!(row.prev_auth_token, "tok-a");
        assert!(!row.auth_token_seen);
        assert_eq!(row.seen_at, 0);
        assert_eq!(row.rotated_at, 100);
        assert_eq!(row.created_at, 100);
        assert_eq!(row.updated_at, 100);
        assert_eq!(row.client_ip, "192.168.10.11");

        assert_eq!(store.find_by_id(id).await.unwrap().unwrap(), row);
        assert!(store.find_by_either_token("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_token_conflicts() {
        let db = Database::open(":memory:").await.unwrap();
        let store = db.sessions();

        store.insert(&new_session(1, "tok-a", 100)).await.unwrap();
        let result = store.insert(&new_session(2, "tok-a", 100)).await;
        assert!(matches!(result, Err(StoreError::Conflict)));
    }

    #[tokio::test]
    async fn test_find_by_previous_token() {
        let db = Database::open(":memory:").await.unwrap();
        let store = db.sessions();

        let id = store.insert(&new_session(1, "tok-a", 100)).await.unwrap();
        let mut row = store.find_by_id(id).await.unwrap().unwrap();
        row.auth_token = "tok-b".to_string();
        row.rotated_at = 200;

        let guard = UpdateGuard::SeenOrRotatedBefore { rotated_before: 110 };
        assert_eq!(store.conditional_update(id, &guard, &row).await.unwrap(), 1);

        let by_prev = store.find_by_either_token("tok-a").await.unwrap().unwrap();
        let by_current = store.find_by_either_token("tok-b").await.unwrap().unwrap();
        assert_eq!(by_prev.id, id);
        assert_eq!(by_current.id, id);
        assert_eq!(by_current.rotated_at, 200);
    }

    #[tokio::test]
    async fn test_guards_block_updates() {
        let db = Database::open(":memory:").await.unwrap();
        let store = db.sessions();

        let id = store.insert(&new_session(1, "tok-a", 100)).await.unwrap();
        let row = store.find_by_id(id).await.unwrap().unwrap();

        let mut seen = row.clone();
        seen.auth_token_seen = true;
        seen.seen_at = 150;

        // Wrong current token
        let guard = UpdateGuard::CurrentToken {
            auth_token: "tok-x".to_string(),
        };
        assert_eq!(store.conditional_update(id, &guard, &seen).await.unwrap(), 0);

        // Rotated too recently
        let guard = UpdateGuard::PreviousToken {
            prev_auth_token: "tok-a".to_string(),
            rotated_before: 100,
        };
        assert_eq!(store.conditional_update(id, &guard, &seen).await.unwrap(), 0);

        // Not seen and rotated too recently
        let guard = UpdateGuard::SeenOrRotatedBefore { rotated_before: 90 };
        assert_eq!(store.conditional_update(id, &guard, &seen).await.unwrap(), 0);

        assert_eq!(store.find_by_id(id).await.unwrap().unwrap(), row);

        let guard = UpdateGuard::CurrentToken {
            auth_token: "tok-a".to_string(),
        };
        assert_eq!(store.conditional_update(id, &guard, &seen).await.unwrap(), 1);

        let stored = store.find_by_id(id).await.unwrap().unwrap();
        assert!(stored.auth_token_seen);
        assert_eq!(stored.seen_at, 150);

        // Seen rows may rotate regardless of age
        let guard = UpdateGuard::SeenOrRotatedBefore { rotated_before: 90 };
        assert_eq!(store.conditional_update(id, &guard, &seen).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_does_not_touch_other_rows() {
        let db = Database::open(":memory:").await.unwrap();
        let store = db.sessions();

        let a = store.insert(&new_session(1, "tok-a", 100)).await.unwrap();
        let b = store.insert(&new_session(1, "tok-b", 100)).await.unwrap();

        let mut row = store.find_by_id(a).await.unwrap().unwrap();
        row.user_agent = "changed".to_string();

        // Guard matches row b's token but targets row a
        let guard = UpdateGuard::CurrentToken {
            auth_token: "tok-b".to_string(),
        };
        assert_eq!(store.conditional_update(a, &guard, &row).await.unwrap(), 0);
        assert_eq!(
            store.find_by_id(b).await.unwrap().unwrap().user_agent,
            "test-agent"
        );
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let db = Database::open(":memory:").await.unwrap();
        let store = db.sessions();

        let a = store.insert(&new_session(1, "tok-a", 100)).await.unwrap();
        let b = store.insert(&new_session(1, "tok-b", 200)).await.unwrap();
        store.insert(&new_session(2, "tok-c", 300)).await.unwrap();

        let listed = store.list_by_user(1).await.unwrap();
        assert_eq!(
            listed.iter().map(|s| s.id).collect::<Vec<_>>(),
            vec![b, a]
        );

        // Wrong owner
        assert!(!store.delete_by_id(2, a).await.unwrap());
        assert!(store.delete_by_id(1, a).await.unwrap());
        assert!(store.delete_by_token("tok-b").await.unwrap());
        assert!(!store.delete_by_token("tok-b").await.unwrap());
        assert!(store.list_by_user(1).await.unwrap().is_empty());

        assert_eq!(store.delete_by_user(2).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_rotated_before() {
        let db = Database::open(":memory:").await.unwrap();
        let store = db.sessions();

        store.insert(&new_session(1, "tok-a", 100)).await.unwrap();
        store.insert(&new_session(1, "tok-b", 200)).await.unwrap();

        assert_eq!(store.delete_rotated_before(150).await.unwrap(), 1);
        assert!(store.find_by_either_token("tok-a").await.unwrap().is_none());
        assert!(store.find_by_either_token("tok-b").await.unwrap().is_some());
    }
}
