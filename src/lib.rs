pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod clock;
pub mod db;
pub mod jwt;
pub mod session;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use api::create_api_router;
use auth::{CookieSettings, add_session_cookie};
use axum::{Router, middleware};
use clock::Clock;
use db::Database;
use session::{SessionConfig, SessionEngine};
use tokio::net::TcpListener;
use url::Url;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Public URL of the server, used as token issuer and audience
    pub base_url: Url,
    /// Secret for signing tokens and keying stored token values
    pub secret_key: Vec<u8>,
    /// Session lifetimes and check mode
    pub session: SessionConfig,
    /// Max-Age of the session cookie
    pub cookie_max_age: Duration,
    /// Whether to set Secure flag on cookies (should be true in production with HTTPS)
    pub secure_cookies: bool,
    /// Proxy header carrying the client IP (requires running behind a proxy)
    pub ip_header: Option<cli::ClientIpHeader>,
}

impl ServerConfig {
    /// Build a session engine over the SQLite store with the given clock.
    pub fn session_engine(&self, clock: Arc<dyn Clock>) -> SessionEngine {
        SessionEngine::new(
            Arc::new(self.db.sessions()),
            &self.secret_key,
            &self.base_url,
            self.session.clone(),
            clock,
        )
    }

    pub fn cookie_settings(&self) -> CookieSettings {
        CookieSettings {
            secure: self.secure_cookies,
            max_age: self.cookie_max_age,
        }
    }
}

/// Create the application router around an existing engine.
pub fn create_router(
    engine: SessionEngine,
    cookies: CookieSettings,
    ip_header: Option<cli::ClientIpHeader>,
) -> Router {
    let api_router =
        create_api_router(engine, cookies, ip_header).layer(middleware::from_fn(add_session_cookie));

    Router::new().nest("/api", api_router)
}

/// Run cleanup tasks and spawn background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(engine: &SessionEngine) {
    cleanup::run_cleanup(engine).await;
    cleanup::spawn_cleanup_scheduler(engine.clone());
}

/// Serve the API on `listener` until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(
    engine: SessionEngine,
    cookies: CookieSettings,
    ip_header: Option<cli::ClientIpHeader>,
    listener: TcpListener,
) -> Result<(), std::io::Error> {
    let app = create_router(engine, cookies, ip_header);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}
