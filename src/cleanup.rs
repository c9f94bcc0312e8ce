//! Scheduled cleanup of abandoned sessions.

use std::time::Duration;

use tracing::{error, info};

use crate::session::SessionEngine;

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

/// Run all cleanup tasks once.
pub async fn run_cleanup(engine: &SessionEngine) {
    match engine.reap_expired(engine.config().max_session_age).await {
        Ok(count) if count > 0 => info!("Cleaned up {} abandoned sessions", count),
        Ok(_) => {}
        Err(e) => error!("Failed to clean up abandoned sessions: {}", e),
    }
}

/// Spawn a background task that runs cleanup periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(engine: SessionEngine) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

        loop {
            interval.tick().await;
            run_cleanup(&engine).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use url::Url;

    use super::*;
    use crate::clock::ManualClock;
    use crate::db::MemorySessionStore;
    use crate::session::{DEFAULT_MAX_SESSION_AGE, SessionConfig};

    #[tokio::test]
    async fn test_run_cleanup_reaps_old_sessions() {
        let store = MemorySessionStore::new();
        let clock = Arc::new(ManualClock::new(1_000_000));
        let engine = SessionEngine::new(
            Arc::new(store.clone()),
            b"test-secret-key-for-testing-only",
            &Url::parse("http://localhost").unwrap(),
            SessionConfig::default(),
            clock.clone(),
        );

        engine.create_session(1, "10.0.0.1", "ua").await.unwrap();
        run_cleanup(&engine).await;
        assert_eq!(store.len(), 1);

        clock.advance(DEFAULT_MAX_SESSION_AGE.as_secs() as i64 + 1);
        run_cleanup(&engine).await;
        assert!(store.is_empty());
    }
}
