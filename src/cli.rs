//! CLI argument parsing, validation, and startup helpers.

use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use url::Url;

use crate::ServerConfig;
use crate::db::Database;
use crate::session::{
    DEFAULT_MAX_SESSION_AGE, DEFAULT_SESSION_LIFETIME, SessionCheckMode, SessionConfig,
    SessionEngine,
};

const MIN_SECRET_LENGTH: usize = 32;

/// Upper bound for any duration flag: 10 years
const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Environment variable holding the signing secret.
pub const SECRET_ENV_VAR: &str = "SESSION_SECRET";

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

/// Header a reverse proxy uses to pass the client address.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientIpHeader {
    /// `X-Real-IP`
    XRealIp,
    /// Leftmost entry of `X-Forwarded-For`
    XForwardedFor,
    /// `CF-Connecting-IP`
    CfConnectingIp,
}

impl ClientIpHeader {
    pub fn header_name(self) -> &'static str {
        match self {
            ClientIpHeader::XRealIp => "x-real-ip",
            ClientIpHeader::XForwardedFor => "x-forwarded-for",
            ClientIpHeader::CfConnectingIp => "cf-connecting-ip",
        }
    }

    /// Pull the client address out of a header value.
    pub fn extract(self, value: &str) -> Result<String, &'static str> {
        let candidate = match self {
            ClientIpHeader::XForwardedFor => value.split(',').next().unwrap_or(""),
            ClientIpHeader::XRealIp | ClientIpHeader::CfConnectingIp => value,
        };
        let candidate = candidate.trim();
        if candidate.is_empty() {
            return Err("IP header is empty");
        }
        Ok(candidate.to_string())
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "sessionrook",
    about = "Rotating cookie sessions behind short-lived signed tokens"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "7291")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, env = "SESSIONROOK_DATABASE", default_value = "sessionrook.db")]
    pub database: String,

    /// Public URL of the server; used as token audience and to decide on secure cookies
    #[arg(long, env = "SESSIONROOK_BASE_URL", default_value = "http://localhost:7291")]
    pub base_url: String,

    /// Path to file containing the signing secret. Prefer using SESSION_SECRET env var instead
    #[arg(long)]
    pub secret_key_file: Option<String>,

    /// Lifetime of a signed session token, in seconds
    #[arg(long, value_name = "SECONDS", default_value_t = crate::jwt::DEFAULT_TOKEN_LIFETIME.as_secs())]
    pub token_lifetime: u64,

    /// How long after issuance an expired token can still be refreshed, in seconds
    #[arg(long, value_name = "SECONDS", default_value_t = DEFAULT_SESSION_LIFETIME.as_secs())]
    pub session_lifetime: u64,

    /// Delete sessions not rotated for this long, in seconds
    #[arg(long, value_name = "SECONDS", default_value_t = DEFAULT_MAX_SESSION_AGE.as_secs())]
    pub max_session_age: u64,

    /// Max-Age of the session cookie, in seconds
    #[arg(long, value_name = "SECONDS", default_value_t = DEFAULT_COOKIE_MAX_AGE.as_secs())]
    pub cookie_max_age: u64,

    /// Whether unexpired tokens are also checked against the session store
    #[arg(long, value_enum, default_value_t = SessionCheckMode::OnExpiry)]
    pub session_check: SessionCheckMode,

    /// Read the client IP from this proxy header instead of the socket address
    #[arg(long, value_enum)]
    pub ip_header: Option<ClientIpHeader>,

    /// Create a session for this user ID on startup and print its cookie
    #[arg(long, value_name = "USER_ID")]
    pub issue_session: Option<i64>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Default browser-side lifetime of the session cookie: 1 day
pub const DEFAULT_COOKIE_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

impl Args {
    /// Session lifetimes from the command line.
    /// Returns None and logs an error if they are inconsistent.
    pub fn session_config(&self) -> Option<SessionConfig> {
        for (flag, value) in [
            ("token-lifetime", self.token_lifetime),
            ("session-lifetime", self.session_lifetime),
            ("max-session-age", self.max_session_age),
            ("cookie-max-age", self.cookie_max_age),
        ] {
            if value > MAX_DURATION_SECS {
                error!(
                    flag,
                    value,
                    max = MAX_DURATION_SECS,
                    "Duration is out of range"
                );
                return None;
            }
        }
        if self.max_session_age == 0 {
            error!("max-session-age must be positive");
            return None;
        }
        if self.token_lifetime == 0 {
            error!("token-lifetime must be positive");
            return None;
        }
        if self.session_lifetime < self.token_lifetime {
            error!(
                token_lifetime = self.token_lifetime,
                session_lifetime = self.session_lifetime,
                "session-lifetime must not be shorter than token-lifetime"
            );
            return None;
        }

        Some(SessionConfig {
            token_lifetime: Duration::from_secs(self.token_lifetime),
            session_lifetime: Duration::from_secs(self.session_lifetime),
            max_session_age: Duration::from_secs(self.max_session_age),
            check_mode: self.session_check,
            ..SessionConfig::default()
        })
    }
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load the signing secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_secret_key(secret_key_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var(SECRET_ENV_VAR) {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var(SECRET_ENV_VAR) };
        secret
    } else if let Some(path) = secret_key_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read secret key file");
                return None;
            }
        }
    } else {
        error!(
            "Signing secret is required. Set {} environment variable (recommended) or use --secret-key-file",
            SECRET_ENV_VAR
        );
        return None;
    };

    if secret.len() < MIN_SECRET_LENGTH {
        error!(
            "Signing secret is shorter than {} characters. Use a longer secret",
            MIN_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Parse and validate the base URL.
/// Returns None and logs an error if validation fails.
pub fn validate_base_url(base_url: &str) -> Option<Url> {
    let url = match Url::parse(base_url) {
        Ok(url) => url,
        Err(e) => {
            error!(url = %base_url, error = %e, "Invalid base URL");
            return None;
        }
    };

    let is_https = url.scheme() == "https";
    let is_localhost = url.host_str() == Some("localhost");

    if !is_https && !is_localhost {
        error!("base-url must use HTTPS for non-localhost deployments");
        return None;
    }

    Some(url)
}

/// Handle the --issue-session flag: create a session and print its cookie.
pub async fn handle_issue_session(engine: &SessionEngine, user_id: i64) {
    match engine.create_session(user_id, "127.0.0.1", "sessionrook-cli").await {
        Ok(issued) => {
            println!();
            println!("Session {} created for user {}", issued.session.id, user_id);
            println!("Cookie: session={}", issued.token.token);
            println!();
        }
        Err(e) => {
            error!(user_id, error = %e, "Failed to issue session");
            std::process::exit(1);
        }
    }
}

/// Build ServerConfig from validated arguments.
pub fn build_config(
    db: Database,
    base_url: Url,
    secret_key: String,
    session: SessionConfig,
    cookie_max_age: Duration,
    ip_header: Option<ClientIpHeader>,
) -> ServerConfig {
    let secure_cookies = base_url.scheme() == "https";

    ServerConfig {
        db,
        base_url,
        secret_key: secret_key.into_bytes(),
        session,
        cookie_max_age,
        secure_cookies,
        ip_header,
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["sessionrook"]);
        assert_eq!(args.port, 7291);
        assert_eq!(args.token_lifetime, 60);
        assert_eq!(args.session_lifetime, 600);
        assert_eq!(args.cookie_max_age, 86400);
        assert_eq!(args.session_check, SessionCheckMode::OnExpiry);
        assert!(args.ip_header.is_none());

        let config = args.session_config().unwrap();
        assert_eq!(config.token_lifetime, Duration::from_secs(60));
        assert_eq!(config.session_lifetime, Duration::from_secs(600));
    }

    #[test]
    fn test_flags() {
        let args = Args::parse_from([
            "sessionrook",
            "--session-check",
            "always",
            "--ip-header",
            "x-forwarded-for",
            "--issue-session",
            "42",
        ]);
        assert_eq!(args.session_check, SessionCheckMode::Always);
        assert_eq!(args.ip_header, Some(ClientIpHeader::XForwardedFor));
        assert_eq!(args.issue_session, Some(42));
    }

    #[test]
    fn test_session_lifetime_shorter_than_token_rejected() {
        let args = Args::parse_from([
            "sessionrook",
            "--token-lifetime",
            "120",
            "--session-lifetime",
            "60",
        ]);
        assert!(args.session_config().is_none());
    }

    #[test]
    fn test_out_of_range_durations_rejected() {
        for flag in [
            "--token-lifetime",
            "--session-lifetime",
            "--max-session-age",
            "--cookie-max-age",
        ] {
            let args = Args::parse_from(["sessionrook", flag, "18446744073709551615"]);
            assert!(args.session_config().is_none(), "{} should be rejected", flag);
        }

        let args = Args::parse_from(["sessionrook", "--max-session-age", "0"]);
        assert!(args.session_config().is_none());

        let ten_years = MAX_DURATION_SECS.to_string();
        let args = Args::parse_from([
            "sessionrook",
            "--session-lifetime",
            ten_years.as_str(),
            "--max-session-age",
            ten_years.as_str(),
        ]);
        let config = args.session_config().unwrap();
        assert_eq!(config.max_session_age, Duration::from_secs(MAX_DURATION_SECS));
    }

    #[test]
    fn test_validate_base_url() {
        assert!(validate_base_url("https://example.com").is_some());
        assert!(validate_base_url("http://localhost:7291").is_some());
        assert!(validate_base_url("http://example.com").is_none());
        assert!(validate_base_url("not a url").is_none());
    }

    #[test]
    fn test_ip_header_extract() {
        assert_eq!(
            ClientIpHeader::XForwardedFor.extract(" 1.2.3.4 , 10.0.0.1").as_deref(),
            Ok("1.2.3.4")
        );
        assert_eq!(
            ClientIpHeader::XRealIp.extract("1.2.3.4").as_deref(),
            Ok("1.2.3.4")
        );
        assert!(ClientIpHeader::CfConnectingIp.extract("  ").is_err());
    }
}
