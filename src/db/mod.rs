mod memory;
mod session;
mod store;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

pub use memory::MemorySessionStore;
pub use session::{NewSession, Session, SqliteSessionStore};
pub use store::{SessionStore, StoreError, UpdateGuard};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open or create a database at the given path.
    /// Use ":memory:" for an in-memory database.
    pub async fn open(path: &str) -> Result<Self, sqlx::Error> {
        let (url, max_connections) = if path == ":memory:" {
            // Every in-memory connection shares one database; a single
            // connection keeps writers from tripping over shared-cache locks.
            ("sqlite::memory:".to_string(), 1)
        } else {
            (format!("sqlite:{}?mode=rwc", path), 5)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(&url)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Get the current schema version.
    async fn get_version(&self) -> Result<i32, sqlx::Error> {
        let result: Option<(i32,)> = sqlx::query_as("SELECT version FROM schema_version LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(result.map(|r| r.0).unwrap_or(0))
    }

    /// Set the schema version within a transaction.
    async fn set_version(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        version: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM schema_version")
            .execute(&mut **tx)
            .await?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
            .bind(version)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Run database migrations.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
            .execute(&self.pool)
            .await?;

        let version = self.get_version().await?;

        if version < 1 {
            self.migrate_v1().await?;
        }

        Ok(())
    }

    /// Execute a list of queries in a transaction, then set the version.
    async fn run_migration(
        &self,
        version: i32,
        queries: &[&'static str],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for query in queries {
            sqlx::query(*query).execute(&mut *tx).await?;
        }
        Self::set_version(&mut tx, version).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn migrate_v1(&self) -> Result<(), sqlx::Error> {
        self.run_migration(
            1,
            &[
                "CREATE TABLE user_sessions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL CHECK (user_id > 0),
                    auth_token TEXT UNIQUE NOT NULL,
                    prev_auth_token TEXT UNIQUE NOT NULL,
                    auth_token_seen INTEGER NOT NULL DEFAULT 0,
                    seen_at INTEGER NOT NULL DEFAULT 0,
                    rotated_at INTEGER NOT NULL,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL,
                    client_ip TEXT NOT NULL DEFAULT '',
                    user_agent TEXT NOT NULL DEFAULT ''
                )",
                "CREATE INDEX idx_user_sessions_user_id ON user_sessions(user_id)",
                "CREATE INDEX idx_user_sessions_rotated_at ON user_sessions(rotated_at)",
            ],
        )
        .await
    }

    /// Get the session store.
    pub fn sessions(&self) -> SqliteSessionStore {
        SqliteSessionStore::new(self.pool.clone())
    }

    /// Get the underlying connection pool (for tests that need raw SQL access).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrations_set_version() {
        let db = Database::open(":memory:").await.unwrap();
        assert_eq!(db.get_version().await.unwrap(), 1);

        // Re-running is a no-op
        db.migrate().await.unwrap();
        assert_eq!(db.get_version().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_user_id_must_be_positive() {
        let db = Database::open(":memory:").await.unwrap();

        let result = sqlx::query(
            "INSERT INTO user_sessions (user_id, auth_token, prev_auth_token, rotated_at, created_at, updated_at)
             VALUES (0, 'a', 'a', 1, 1, 1)",
        )
        .execute(db.pool())
        .await;

        assert!(result.is_err());
    }
}
