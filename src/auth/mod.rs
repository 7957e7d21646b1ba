//! Session enforcement at the HTTP edge.
//!
//! The gate middleware classifies each request path, resolves the session from
//! the signed cookie and the token store, and redirects, purges or annotates
//! the response. Handlers read the outcome through the session extractors.

mod cookie;
mod errors;
mod extractors;
mod gate;
mod ip;
mod janitor;
mod state;

pub use cookie::{
    CALLBACK_COOKIE_NAME, CSRF_COOKIE_NAME, REFRESH_COOKIE_NAME, SESSION_COOKIE_NAME,
    SESSION_COOKIE_NAMES, get_cookie, session_cookie,
};
pub use errors::{ApiAuthError, AuthErrorKind};
pub use extractors::{CurrentSession, OptionalSession, ResolvedSession};
pub use gate::{
    GateDecision, Markers, PathClass, PathRules, REFRESH_NEEDED_HEADER, REFRESH_WINDOW,
    RedirectReason, SESSION_WARNING_HEADER, auth_redirect_url, decide, needs_refresh,
    session_gate,
};
pub use ip::{ClientIpHeader, HasHeadersAndExtensions, IpExtractor, extract_client_ip};
pub use janitor::CookieJanitor;
pub use state::{AuthSettings, AuthState};
