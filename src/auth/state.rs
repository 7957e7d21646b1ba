//! Shared state of the gate and the auth endpoints.

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use tracing::debug;

use super::cookie::get_cookie;
use super::gate::PathRules;
use super::janitor::CookieJanitor;
use crate::jwt::{JwtConfig, SessionClaims};
use crate::session::{AuthUpstream, RefreshCoordinator, Session, TokenStore};

/// Static settings fixed at startup.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub auth_page: String,
    pub landing_page: String,
    pub paths: PathRules,
    /// Name of the cookie carrying the signed session artifact.
    pub session_cookie: String,
    /// Secure cookies and the restrictive CSP.
    pub production: bool,
    pub session_ttl: Duration,
}

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<JwtConfig>,
    pub store: Arc<dyn TokenStore>,
    pub coordinator: Arc<RefreshCoordinator>,
    pub upstream: Arc<dyn AuthUpstream>,
    pub janitor: Arc<CookieJanitor>,
    pub settings: Arc<AuthSettings>,
}

impl AuthState {
    /// Claims of a valid session artifact in the request cookies.
    pub fn session_claims(&self, headers: &HeaderMap) -> Option<SessionClaims> {
        let token = get_cookie(headers, &self.settings.session_cookie)?;
        match self.jwt.validate_session_token(token) {
            Ok(claims) => Some(claims),
            Err(e) => {
                debug!(error = %e, "Ignoring invalid session artifact");
                None
            }
        }
    }

    /// The stored session the request's artifact points to, in any error state.
    pub fn resolve_session(&self, headers: &HeaderMap) -> Option<Session> {
        let claims = self.session_claims(headers)?;
        let session = self.store.read(&claims.sid)?;
        if session.user_id != claims.sub {
            debug!(session_id = %claims.sid, "Session artifact subject mismatch");
            return None;
        }
        Some(session)
    }

    /// Remove the session record and forget its refresh state. Returns whether
    /// a record existed.
    pub fn destroy_session(&self, session_id: &str) -> bool {
        let removed = self.store.remove(session_id);
        self.coordinator.forget(session_id);
        removed
    }
}
