//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::auth::{ClientIpHeader, IpExtractor};
use crate::session::HttpAuthUpstream;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};
use url::Url;

const MIN_SESSION_SECRET_LENGTH: usize = 32;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "sessiongate",
    about = "Session gate and token refresh coordinator for a token backend"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "7300")]
    pub port: u16,

    /// Base URL of the token backend (serves /auth/refresh, /auth/login, /auth/register)
    #[arg(long, env = "UPSTREAM_URL", default_value = "http://localhost:8000")]
    pub upstream_url: String,

    /// Path to file containing the session secret. Prefer using SESSION_SECRET env var instead
    #[arg(long)]
    pub session_secret_file: Option<String>,

    /// Auth page unauthenticated requests are redirected to
    #[arg(long, default_value = "/auth/login", value_parser = validate_path)]
    pub auth_page: String,

    /// Landing page for authenticated visitors of the auth page
    #[arg(long, default_value = "/dashboard", value_parser = validate_path)]
    pub landing_page: String,

    /// Public path rule; a trailing '/' matches as a prefix. Repeat for several
    #[arg(long = "public-path", value_parser = validate_path)]
    pub public_paths: Vec<String>,

    /// Root domain, to also clear cookies scoped to subdomains
    #[arg(long, env = "COOKIE_DOMAIN")]
    pub cookie_domain: Option<String>,

    /// Extra cookie name cleared when a session ends. Repeat for several
    #[arg(
        long = "cookie-name",
        env = "COOKIE_NAMES",
        value_delimiter = ',',
        value_parser = validate_cookie_name
    )]
    pub cookie_names: Vec<String>,

    /// Secure cookies and a restrictive Content-Security-Policy
    #[arg(long)]
    pub production: bool,

    /// Upstream refresh timeout in milliseconds (capped at the 2000 ms cooldown)
    #[arg(long, default_value = "2000")]
    pub refresh_timeout_ms: u64,

    /// Lifetime of the session cookie in hours
    #[arg(long, default_value = "720")]
    pub session_ttl_hours: u64,

    /// Read the client IP from this header (only behind a trusted proxy)
    #[arg(long)]
    pub ip_header: Option<ClientIpHeader>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

fn validate_path(s: &str) -> Result<String, String> {
    if !s.starts_with('/') {
        return Err(format!("Path must start with '/': {}", s));
    }

    if s.chars().any(|c| !c.is_ascii() || c.is_whitespace()) {
        return Err(format!("Path contains invalid characters: {}", s));
    }

    Ok(s.to_string())
}

fn validate_cookie_name(s: &str) -> Result<String, String> {
    let valid = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c));
    if !valid {
        return Err(format!("Invalid cookie name: {}", s));
    }
    Ok(s.to_string())
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load the session secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_session_secret(session_secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var("SESSION_SECRET") {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var("SESSION_SECRET") };
        secret
    } else if let Some(path) = session_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read session secret file");
                return None;
            }
        }
    } else {
        error!(
            "Session secret is required. Set SESSION_SECRET environment variable (recommended) or use --session-secret-file"
        );
        return None;
    };

    if secret.len() < MIN_SESSION_SECRET_LENGTH {
        error!(
            "Session secret is shorter than {} characters. Use a longer secret",
            MIN_SESSION_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Parse and validate the upstream URL.
/// Returns None and logs an error if validation fails.
pub fn validate_upstream_url(upstream_url: &str, production: bool) -> Option<Url> {
    let url = match Url::parse(upstream_url) {
        Ok(url) => url,
        Err(e) => {
            error!(url = %upstream_url, error = %e, "Invalid upstream URL");
            return None;
        }
    };

    if !matches!(url.scheme(), "http" | "https") {
        error!(url = %upstream_url, "Upstream URL must use http or https");
        return None;
    }

    let is_local = matches!(url.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"));
    if production && url.scheme() != "https" && !is_local {
        warn!("Upstream URL is not HTTPS; refresh tokens will cross the network in clear text");
    }

    Some(url)
}

/// Build ServerConfig from validated arguments.
pub fn build_config(args: Args, upstream_url: Url, session_secret: String) -> ServerConfig {
    let upstream = Arc::new(HttpAuthUpstream::new(upstream_url));
    let mut config = ServerConfig::new(session_secret.into_bytes(), upstream);

    if config.auth_pages.first() == Some(&config.auth_page) {
        config.auth_pages[0] = args.auth_page.clone();
    }
    config.auth_page = args.auth_page;
    config.landing_page = args.landing_page;
    if !args.public_paths.is_empty() {
        config.public_paths = args.public_paths;
    }
    for name in args.cookie_names {
        if !config.cookie_names.contains(&name) {
            config.cookie_names.push(name);
        }
    }
    config.cookie_domain = args.cookie_domain;
    config.production = args.production;
    config.refresh_timeout = Duration::from_millis(args.refresh_timeout_ms);
    config.session_ttl = Duration::from_secs(args.session_ttl_hours.saturating_mul(3600));
    config.ip_extractor = args.ip_header.map(IpExtractor::from);
    config
}
