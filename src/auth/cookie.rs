//! Cookie names, parsing and the session cookie.

use axum::http::header;

/// Cookie carrying the signed session artifact.
pub const SESSION_COOKIE_NAME: &str = "session_token";

/// CSRF companion cookie.
pub const CSRF_COOKIE_NAME: &str = "csrf_token";

/// Post-login callback URL cookie.
pub const CALLBACK_COOKIE_NAME: &str = "callback_url";

/// Refresh token cookie.
pub const REFRESH_COOKIE_NAME: &str = "refresh_token";

/// Every cookie name that may carry session material.
pub const SESSION_COOKIE_NAMES: [&str; 4] = [
    SESSION_COOKIE_NAME,
    CSRF_COOKIE_NAME,
    CALLBACK_COOKIE_NAME,
    REFRESH_COOKIE_NAME,
];

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a axum::http::HeaderMap, name: &str) -> Option<&'a str> {
    for cookie_header in headers.get_all(header::COOKIE) {
        let Ok(cookie_header) = cookie_header.to_str() else {
            continue;
        };
        for part in cookie_header.split(';') {
            let part = part.trim();
            if let Some((key, value)) = part.split_once('=') {
                if key.trim() == name {
                    return Some(value.trim());
                }
            }
        }
    }
    None
}

/// Name of the cookie a `Set-Cookie` header value targets.
pub fn set_cookie_name(set_cookie: &str) -> Option<&str> {
    set_cookie
        .split_once('=')
        .map(|(name, _)| name.trim())
        .filter(|name| !name.is_empty())
}

/// Build the `Set-Cookie` value for the session artifact.
pub fn session_cookie(name: &str, token: &str, max_age: u64, secure: bool) -> String {
    let secure = if secure { "; Secure" } else { "" };
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}{}",
        name, token, max_age, secure
    )
}
