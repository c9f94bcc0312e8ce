#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    extract::ConnectInfo,
    http::{Request, Response},
};
use sessionrook::{
    ServerConfig,
    auth::CookieSettings,
    cli::ClientIpHeader,
    clock::ManualClock,
    create_router,
    db::Database,
    session::{SessionConfig, SessionEngine},
};
use tower::ServiceExt;
use url::Url;

/// Fixed start time for tests (2018-12-13T13:45:00Z).
pub const T0: i64 = 1_544_708_700;
pub const TEST_IP: &str = "127.0.0.1";
pub const ALT_IP: &str = "192.168.1.100";
pub const TEST_SECRET: &[u8] = b"test-secret-key-for-testing-only";

pub struct TestApp {
    pub app: Router,
    pub db: Database,
    pub engine: SessionEngine,
    pub clock: Arc<ManualClock>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_options(SessionConfig::default(), None).await
    }

    pub async fn with_options(session: SessionConfig, ip_header: Option<ClientIpHeader>) -> Self {
        let db = Database::open(":memory:")
            .await
            .expect("Failed to open test database");
        let config = ServerConfig {
            db: db.clone(),
            base_url: Url::parse("http://localhost").expect("Invalid URL"),
            secret_key: TEST_SECRET.to_vec(),
            session,
            cookie_max_age: Duration::from_secs(86400),
            secure_cookies: false,
            ip_header,
        };
        let clock = Arc::new(ManualClock::new(T0));
        let engine = config.session_engine(clock.clone());
        let cookies = CookieSettings {
            secure: config.secure_cookies,
            max_age: config.cookie_max_age,
        };
        let app = create_router(engine.clone(), cookies, ip_header);

        Self {
            app,
            db,
            engine,
            clock,
        }
    }

    /// Create a session and return its cookie value.
    pub async fn login(&self, user_id: i64) -> String {
        self.engine
            .create_session(user_id, TEST_IP, "test-agent")
            .await
            .expect("Failed to create session")
            .token
            .token
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    /// Send a request carrying the session cookie from `TEST_IP`.
    pub async fn request(&self, method: &str, uri: &str, token: &str) -> Response<Body> {
        self.send(session_request(method, uri, token)).await
    }
}

pub fn session_request(method: &str, uri: &str, token: &str) -> Request<Body> {
    let addr: SocketAddr = format!("{}:51000", TEST_IP).parse().unwrap();
    Request::builder()
        .method(method)
        .uri(uri)
        .header("cookie", format!("session={}", token))
        .header("user-agent", "test-agent")
        .extension(ConnectInfo(addr))
        .body(Body::empty())
        .unwrap()
}

/// Extract all Set-Cookie headers from response
pub fn extract_set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .collect()
}

/// Check if cookies contain the session cookie being cleared (Max-Age=0)
pub fn has_cleared_cookie(cookies: &[String]) -> bool {
    cookies
        .iter()
        .any(|c| c.starts_with("session=;") && c.contains("Max-Age=0"))
}

/// Value of a newly set session cookie, if any
pub fn new_session_cookie(cookies: &[String]) -> Option<String> {
    cookies
        .iter()
        .filter(|c| !c.contains("Max-Age=0"))
        .find_map(|c| c.strip_prefix("session="))
        .and_then(|rest| rest.split(';').next())
        .map(|s| s.to_string())
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
