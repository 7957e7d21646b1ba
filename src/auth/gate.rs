//! Session gate: the per-request enforcement point.
//!
//! Every request is classified by path and matched against the session read
//! from the token store. [`decide`] is a pure function of
//! `(path class, session, now)`; [`session_gate`] applies its decision, adds the
//! response markers and the baseline security headers.

use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::{debug, info};

use super::extractors::ResolvedSession;
use super::state::AuthState;
use crate::csp::apply_security_headers;
use crate::session::{ErrorKind, Session, now_millis};

/// Access tokens expiring within this window get the refresh-needed marker.
pub const REFRESH_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Response header asking the client to trigger a refresh.
pub const REFRESH_NEEDED_HEADER: HeaderName = HeaderName::from_static("x-refresh-needed");

/// Response header naming a recoverable [`ErrorKind`].
pub const SESSION_WARNING_HEADER: HeaderName = HeaderName::from_static("x-session-warning");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathClass {
    Public,
    AuthPage,
    Protected,
}

/// Path classification rules.
///
/// Auth pages match exactly or as a directory prefix (`/auth/login/...`).
/// Public rules ending in `/` match as a prefix, others exactly. Anything
/// unmatched is protected.
#[derive(Debug, Clone)]
pub struct PathRules {
    auth_pages: Vec<String>,
    public: Vec<String>,
}

impl PathRules {
    pub fn new(auth_pages: Vec<String>, public: Vec<String>) -> Self {
        Self { auth_pages, public }
    }

    pub fn classify(&self, path: &str) -> PathClass {
        let is_auth_page = self.auth_pages.iter().any(|page| {
            path == page
                || path
                    .strip_prefix(page.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        });
        if is_auth_page {
            return PathClass::AuthPage;
        }

        let is_public = self.public.iter().any(|rule| {
            if rule.ends_with('/') && rule.len() > 1 {
                path.starts_with(rule.as_str())
            } else {
                path == rule
            }
        });
        if is_public {
            PathClass::Public
        } else {
            PathClass::Protected
        }
    }
}

/// `error` query value of an auth-page redirect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectReason {
    NotAuthenticated,
    SessionExpired,
}

impl RedirectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotAuthenticated => "not_authenticated",
            Self::SessionExpired => "session_expired",
        }
    }
}

/// Markers attached to an allowed request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Markers {
    /// The session counts as authenticated for this request.
    pub authenticated: bool,
    pub warning: Option<ErrorKind>,
    pub refresh_needed: bool,
}

impl Markers {
    pub fn apply(&self, headers: &mut HeaderMap) {
        if self.refresh_needed {
            headers.insert(REFRESH_NEEDED_HEADER, HeaderValue::from_static("true"));
        }
        if let Some(kind) = self.warning {
            headers.insert(SESSION_WARNING_HEADER, HeaderValue::from_static(kind.as_str()));
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Protected path without a session.
    Deny,
    /// Protected path with an unrecoverable session: purge and redirect.
    Destroy,
    /// Auth page with a fully valid session.
    ToLanding,
    Allow(Markers),
}

/// True when the access token is live and expires within [`REFRESH_WINDOW`].
pub fn needs_refresh(session: &Session, now: i64) -> bool {
    let window = REFRESH_WINDOW.as_millis() as i64;
    session
        .time_until_expiry(now)
        .is_some_and(|left| left > 0 && left <= window)
}

/// Decide what the gate does with a request.
pub fn decide(class: PathClass, session: Option<&Session>, now: i64) -> GateDecision {
    let Some(session) = session else {
        return match class {
            PathClass::Protected => GateDecision::Deny,
            _ => GateDecision::Allow(Markers::default()),
        };
    };

    if session.is_terminal() {
        return match class {
            PathClass::Protected => GateDecision::Destroy,
            _ => GateDecision::Allow(Markers::default()),
        };
    }

    if class == PathClass::AuthPage && session.error_state.is_none() && session.is_valid(now) {
        return GateDecision::ToLanding;
    }

    let warning = match class {
        PathClass::Protected => session.error_state,
        _ => None,
    };

    GateDecision::Allow(Markers {
        authenticated: true,
        warning,
        refresh_needed: needs_refresh(session, now),
    })
}

/// Auth-page URL carrying `error` and `callbackUrl`.
pub fn auth_redirect_url(auth_page: &str, reason: RedirectReason, callback: &str) -> String {
    format!(
        "{}?error={}&callbackUrl={}",
        auth_page,
        reason.as_str(),
        urlencoding::encode(callback)
    )
}

/// Middleware enforcing session state on every request.
pub async fn session_gate(
    State(state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let now = now_millis();
    let class = state.settings.paths.classify(request.uri().path());
    let callback = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    let session = state.resolve_session(request.headers());
    let decision = decide(class, session.as_ref(), now);
    debug!(path = %request.uri().path(), class = ?class, decision = ?decision, "Gate decision");

    let mut response = match decision {
        GateDecision::Deny => Redirect::temporary(&auth_redirect_url(
            &state.settings.auth_page,
            RedirectReason::NotAuthenticated,
            &callback,
        ))
        .into_response(),
        GateDecision::Destroy => {
            if let Some(session) = &session {
                state.destroy_session(&session.session_id);
                info!(
                    session_id = %session.session_id,
                    kind = ?session.error_state,
                    "Session destroyed"
                );
            }
            let redirect = Redirect::temporary(&auth_redirect_url(
                &state.settings.auth_page,
                RedirectReason::SessionExpired,
                &callback,
            ));
            state.janitor.purge_response(redirect.into_response())
        }
        GateDecision::ToLanding => {
            Redirect::temporary(&state.settings.landing_page).into_response()
        }
        GateDecision::Allow(markers) => {
            let resolved = session.filter(|_| markers.authenticated);
            request.extensions_mut().insert(ResolvedSession(resolved));
            let mut response = next.run(request).await;
            markers.apply(response.headers_mut());
            response
        }
    };

    apply_security_headers(response.headers_mut(), state.settings.production);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::TokenResponse;

    const NOW: i64 = 1_700_000_000_000;

    fn rules() -> PathRules {
        PathRules::new(
            vec!["/auth/login".into(), "/auth/register".into()],
            vec![
                "/".into(),
                "/health".into(),
                "/auth/".into(),
                "/public/".into(),
            ],
        )
    }

    fn session_expiring_in(millis: i64) -> Session {
        let mut session = Session::issue(
            "sid",
            "user",
            TokenResponse {
                access_token: "a".into(),
                refresh_token: Some("r".into()),
                expires_in: 60,
            },
            NOW,
            Duration::from_secs(3600),
        );
        if let Some(token) = session.access_token.as_mut() {
            token.expires_at = NOW + millis;
        }
        session
    }

    #[test]
    fn test_classify_paths() {
        let rules = rules();
        assert_eq!(rules.classify("/auth/login"), PathClass::AuthPage);
        assert_eq!(rules.classify("/auth/login/"), PathClass::AuthPage);
        assert_eq!(rules.classify("/auth/loginx"), PathClass::Public);
        assert_eq!(rules.classify("/auth/refresh"), PathClass::Public);
        assert_eq!(rules.classify("/"), PathClass::Public);
        assert_eq!(rules.classify("/public/logo.png"), PathClass::Public);
        assert_eq!(rules.classify("/health"), PathClass::Public);
        assert_eq!(rules.classify("/healthz"), PathClass::Protected);
        assert_eq!(rules.classify("/dashboard"), PathClass::Protected);
    }

    #[test]
    fn test_no_session() {
        assert_eq!(decide(PathClass::Protected, None, NOW), GateDecision::Deny);
        assert_eq!(
            decide(PathClass::Public, None, NOW),
            GateDecision::Allow(Markers::default())
        );
        assert_eq!(
            decide(PathClass::AuthPage, None, NOW),
            GateDecision::Allow(Markers::default())
        );
    }

    #[test]
    fn test_unrecoverable_session() {
        for kind in [
            ErrorKind::RefreshTokenExpired,
            ErrorKind::TokenFamilyInvalidated,
            ErrorKind::ReuseDetected,
        ] {
            let mut session = session_expiring_in(60_000);
            session.record_failure(kind);
            assert_eq!(
                decide(PathClass::Protected, Some(&session), NOW),
                GateDecision::Destroy
            );
            // Public and auth pages stay reachable, unauthenticated.
            assert_eq!(
                decide(PathClass::Public, Some(&session), NOW),
                GateDecision::Allow(Markers::default())
            );
            assert_eq!(
                decide(PathClass::AuthPage, Some(&session), NOW),
                GateDecision::Allow(Markers::default())
            );
        }
    }

    #[test]
    fn test_recoverable_error_warns_on_protected_path() {
        let mut session = session_expiring_in(60 * 60_000);
        session.record_failure(ErrorKind::NoRefreshToken);

        assert_eq!(
            decide(PathClass::Protected, Some(&session), NOW),
            GateDecision::Allow(Markers {
                authenticated: true,
                warning: Some(ErrorKind::NoRefreshToken),
                refresh_needed: false,
            })
        );
        assert_eq!(
            decide(PathClass::Public, Some(&session), NOW),
            GateDecision::Allow(Markers {
                authenticated: true,
                warning: None,
                refresh_needed: false,
            })
        );
    }

    #[test]
    fn test_auth_page_with_valid_session_goes_to_landing() {
        let session = session_expiring_in(60 * 60_000);
        assert_eq!(
            decide(PathClass::AuthPage, Some(&session), NOW),
            GateDecision::ToLanding
        );

        let mut warned = session.clone();
        warned.record_failure(ErrorKind::RefreshAccessTokenError);
        assert!(matches!(
            decide(PathClass::AuthPage, Some(&warned), NOW),
            GateDecision::Allow(_)
        ));

        let expired = session_expiring_in(-1);
        assert!(matches!(
            decide(PathClass::AuthPage, Some(&expired), NOW),
            GateDecision::Allow(_)
        ));
    }

    #[test]
    fn test_refresh_window_boundary() {
        let window = REFRESH_WINDOW.as_millis() as i64;

        assert!(needs_refresh(&session_expiring_in(window), NOW));
        assert!(!needs_refresh(&session_expiring_in(window + 1), NOW));
        assert!(needs_refresh(&session_expiring_in(1), NOW));
        assert!(!needs_refresh(&session_expiring_in(0), NOW));
        assert!(!needs_refresh(&session_expiring_in(-5_000), NOW));
    }

    #[test]
    fn test_refresh_needed_marker_four_vs_six_minutes() {
        let four = session_expiring_in(4 * 60_000);
        let six = session_expiring_in(6 * 60_000);

        let GateDecision::Allow(markers) = decide(PathClass::Protected, Some(&four), NOW) else {
            panic!("expected allow");
        };
        assert!(markers.refresh_needed);

        let GateDecision::Allow(markers) = decide(PathClass::Protected, Some(&six), NOW) else {
            panic!("expected allow");
        };
        assert!(!markers.refresh_needed);
    }

    #[test]
    fn test_markers_apply_headers() {
        let mut headers = HeaderMap::new();
        Markers {
            authenticated: true,
            warning: Some(ErrorKind::RefreshAccessTokenError),
            refresh_needed: true,
        }
        .apply(&mut headers);

        assert_eq!(headers.get(REFRESH_NEEDED_HEADER).unwrap(), "true");
        assert_eq!(
            headers.get(SESSION_WARNING_HEADER).unwrap(),
            "RefreshAccessTokenError"
        );
    }

    #[test]
    fn test_auth_redirect_url() {
        assert_eq!(
            auth_redirect_url("/auth/login", RedirectReason::SessionExpired, "/dashboard?tab=1"),
            "/auth/login?error=session_expired&callbackUrl=%2Fdashboard%3Ftab%3D1"
        );
    }
}
