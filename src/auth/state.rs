//! Authentication state trait and macro.

use std::time::Duration;

use crate::cli::ClientIpHeader;
use crate::session::SessionEngine;

/// How session cookies are written.
#[derive(Debug, Clone, Copy)]
pub struct CookieSettings {
    /// Set the `Secure` flag (HTTPS deployments)
    pub secure: bool,
    /// Browser-side lifetime of the cookie
    pub max_age: Duration,
}

/// Trait for state types that can authenticate requests.
pub trait HasSessionEngine {
    fn engine(&self) -> &SessionEngine;
    fn cookies(&self) -> CookieSettings;
    fn ip_header(&self) -> Option<ClientIpHeader>;
}

/// Macro to implement `HasSessionEngine` for state structs with the standard fields.
///
/// The struct must have these fields:
/// - `engine: SessionEngine`
/// - `cookies: CookieSettings`
/// - `ip_header: Option<ClientIpHeader>`
#[macro_export]
macro_rules! impl_has_session_engine {
    ($state_type:ty) => {
        impl $crate::auth::HasSessionEngine for $state_type {
            fn engine(&self) -> &$crate::session::SessionEngine {
                &self.engine
            }
            fn cookies(&self) -> $crate::auth::CookieSettings {
                self.cookies
            }
            fn ip_header(&self) -> Option<$crate::cli::ClientIpHeader> {
                self.ip_header
            }
        }
    };
}
