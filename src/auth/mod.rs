//! Cookie-based session authentication for axum.
//!
//! The `session` cookie carries a short-lived signed envelope. The
//! [`SessionAuth`] extractor trusts it until it expires, then refreshes the
//! session and queues a new cookie that [`add_session_cookie`] writes to the
//! response. Terminal failures clear the cookie.

mod cookie;
mod errors;
mod extractors;
mod ip;
mod state;
mod types;

pub use cookie::{SESSION_COOKIE_NAME, clear_session_cookie, get_cookie, session_cookie};
pub use errors::{ApiAuthError, AuthErrorKind};
pub use extractors::{
    NEW_SESSION_COOKIE, SessionAuth, add_session_cookie, discard_new_session_cookie,
};
pub use ip::extract_client_ip;
pub use state::{CookieSettings, HasSessionEngine};
pub use types::AuthenticatedSession;
