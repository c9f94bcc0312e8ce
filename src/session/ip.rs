//! Client address normalization for stored session metadata.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Normalize a client address for storage.
///
/// Accepts `ip`, `ip:port`, `[ipv6]` or `[ipv6]:port`. The port is dropped,
/// IPv4-mapped IPv6 addresses are unwrapped and every loopback address is
/// stored as `127.0.0.1`. Returns `None` for anything that is not an address.
pub fn normalize_client_ip(input: &str) -> Option<String> {
    let input = input.trim();

    let ip = if let Ok(addr) = input.parse::<SocketAddr>() {
        addr.ip()
    } else {
        input
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .ok()?
    };

    let ip = match ip {
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map(IpAddr::V4)
            .unwrap_or(IpAddr::V6(v6)),
        v4 => v4,
    };

    if ip.is_loopback() {
        return Some(Ipv4Addr::LOCALHOST.to_string());
    }

    Some(ip.to_string())
}
