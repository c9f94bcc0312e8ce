//! Client IP extraction utilities.

use std::net::SocketAddr;

use axum::{extract::ConnectInfo, http::request::Parts};

use crate::cli::ClientIpHeader;

/// Extract the client IP for a request.
///
/// If `ip_header` is set, reads the address from that header and returns an
/// error if the header is missing or invalid (does NOT fall back to the
/// socket address). Otherwise uses the `ConnectInfo` socket address.
pub fn extract_client_ip(
    parts: &Parts,
    ip_header: Option<ClientIpHeader>,
) -> Result<String, &'static str> {
    match ip_header {
        Some(ip_header) => {
            let value = parts
                .headers
                .get(ip_header.header_name())
                .ok_or("IP header not present")?
                .to_str()
                .map_err(|_| "IP header contains invalid characters")?;
            ip_header.extract(value)
        }
        None => parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip().to_string())
            .ok_or("No client IP available"),
    }
}
