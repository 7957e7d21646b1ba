//! Axum extractors for the session resolved by the gate.

use axum::{extract::FromRequestParts, http::request::Parts};

use super::errors::{ApiAuthError, AuthErrorKind};
use crate::session::Session;

/// Request extension inserted by the gate. `None` when the request carries no
/// session or one that must be treated as absent.
#[derive(Clone, Debug)]
pub struct ResolvedSession(pub Option<Session>);

/// Extractor for handlers that require an authenticated session.
///
/// The session includes the access token for outbound calls to the backend.
pub struct CurrentSession(pub Session);

impl<S> FromRequestParts<S> for CurrentSession
where
    S: Send + Sync,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<ResolvedSession>() {
            Some(ResolvedSession(Some(session))) => Ok(CurrentSession(session.clone())),
            Some(ResolvedSession(None)) => Err(ApiAuthError::new(AuthErrorKind::NotAuthenticated)),
            None => Err(ApiAuthError::new(AuthErrorKind::GateMissing)),
        }
    }
}

/// Optional session extractor - never fails.
pub struct OptionalSession(pub Option<Session>);

impl<S> FromRequestParts<S> for OptionalSession
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(OptionalSession(
            parts
                .extensions
                .get::<ResolvedSession>()
                .and_then(|resolved| resolved.0.clone()),
        ))
    }
}
