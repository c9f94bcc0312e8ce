mod error;
mod sessions;

use axum::Router;

use crate::auth::CookieSettings;
use crate::cli::ClientIpHeader;
use crate::session::SessionEngine;

pub use sessions::SessionsState;

/// Create the API router.
pub fn create_api_router(
    engine: SessionEngine,
    cookies: CookieSettings,
    ip_header: Option<ClientIpHeader>,
) -> Router {
    let sessions_state = sessions::SessionsState {
        engine,
        cookies,
        ip_header,
    };

    Router::new().nest("/sessions", sessions::router(sessions_state))
}
