//! In-memory session storage.
//!
//! Suitable for tests and single-instance deployments. Each operation takes
//! the lock once, so a conditional update checks its guard and writes in a
//! single step the same way an `UPDATE ... WHERE` does.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::session::{NewSession, Session};
use super::store::{SessionStore, StoreError, UpdateGuard};

#[derive(Default)]
struct Inner {
    next_id: i64,
    rows: HashMap<i64, Session>,
}

/// Session rows held in a `HashMap` behind a `Mutex`.
///
/// Sessions are lost when the process restarts.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows currently stored.
    pub fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, session: &NewSession) -> Result<i64, StoreError> {
        let mut inner = self.lock()?;

        let taken = inner.rows.values().any(|row| {
            row.auth_token == session.auth_token || row.prev_auth_token == session.prev_auth_token
        });
        if taken {
            return Err(StoreError::Conflict);
        }

        inner.next_id += 1;
        let id = inner.next_id;
        inner.rows.insert(id, session.clone().into_session(id));
        Ok(id)
    }

    async fn find_by_either_token(&self, token: &str) -> Result<Option<Session>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .rows
            .values()
            .find(|row| row.auth_token == token || row.prev_auth_token == token)
            .cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Session>, StoreError> {
        Ok(self.lock()?.rows.get(&id).cloned())
    }

    async fn conditional_update(
        &self,
        id: i64,
        guard: &UpdateGuard,
        values: &Session,
    ) -> Result<u64, StoreError> {
        let mut inner = self.lock()?;

        let taken = inner.rows.values().any(|row| {
            row.id != id
                && (row.auth_token == values.auth_token
                    || row.prev_auth_token == values.prev_auth_token)
        });

        let Some(row) = inner.rows.get_mut(&id) else {
            return Ok(0);
        };
        if !guard.matches(row) {
            return Ok(0);
        }
        if taken {
            return Err(StoreError::Conflict);
        }

        row.auth_token = values.auth_token.clone();
        row.prev_auth_token = values.prev_auth_token.clone();
        row.auth_token_seen = values.auth_token_seen;
        row.seen_at = values.seen_at;
        row.rotated_at = values.rotated_at;
        row.updated_at = values.updated_at;
        row.client_ip = values.client_ip.clone();
        row.user_agent = values.user_agent.clone();
        Ok(1)
    }

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<Session>, StoreError> {
        let inner = self.lock()?;
        let mut rows: Vec<Session> = inner
            .rows
            .values()
            .filter(|row| row.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.rotated_at.cmp(&a.rotated_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn delete_by_token(&self, token: &str) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        let before = inner.rows.len();
        inner
            .rows
            .retain(|_, row| row.auth_token != token && row.prev_auth_token != token);
        Ok(inner.rows.len() < before)
    }

    async fn delete_by_id(&self, user_id: i64, id: i64) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        match inner.rows.get(&id) {
            Some(row) if row.user_id == user_id => {
                inner.rows.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_by_user(&self, user_id: i64) -> Result<u64, StoreError> {
        let mut inner = self.lock()?;
        let before = inner.rows.len();
        inner.rows.retain(|_, row| row.user_id != user_id);
        Ok((before - inner.rows.len()) as u64)
    }

    async fn delete_rotated_before(&self, cutoff: i64) -> Result<u64, StoreError> {
        let mut inner = self.lock()?;
        let before = inner.rows.len();
        inner.rows.retain(|_, row| row.rotated_at >= cutoff);
        Ok((before - inner.rows.len()) as u64)
    }
}
