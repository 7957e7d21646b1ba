//! Session API endpoints.
//!
//! - POST `/refresh` - Refresh the session's access token
//! - GET `/session` - Read the current session state (never token values)
//! - POST `/logout` - End the session and clear cookies
//! - POST `/clear-session` - Clear every session cookie variant, always succeeds

use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::{ApiError, sanitize_callback};
use crate::auth::{
    AuthState, RedirectReason, SESSION_WARNING_HEADER, auth_redirect_url, needs_refresh,
};
use crate::session::{ErrorKind, RefreshError, now_millis};

#[derive(Deserialize)]
pub(super) struct CallbackQuery {
    #[serde(rename = "callbackUrl")]
    pub callback_url: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshedResponse {
    expires_at: Option<i64>,
}

#[derive(Serialize)]
struct RecoverableResponse {
    error: ErrorKind,
    recoverable: bool,
}

#[derive(Serialize)]
struct ExpiredResponse {
    error: ErrorKind,
    redirect: String,
}

/// Refresh the session's tokens through the single-flight coordinator.
pub(super) async fn refresh(
    State(state): State<AuthState>,
    Query(query): Query<CallbackQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let session = state
        .resolve_session(&headers)
        .ok_or_else(|| ApiError::unauthorized(RedirectReason::NotAuthenticated.as_str()))?;

    match state.coordinator.refresh(&session.session_id).await {
        Ok(session) => Ok(Json(RefreshedResponse {
            expires_at: session.access_token_expires_at(),
        })
        .into_response()),
        Err(RefreshError::SessionNotFound) => Err(ApiError::unauthorized(
            RedirectReason::NotAuthenticated.as_str(),
        )),
        Err(RefreshError::Failed(kind)) if kind.is_recoverable() => {
            let mut response = Json(RecoverableResponse {
                error: kind,
                recoverable: true,
            })
            .into_response();
            response
                .headers_mut()
                .insert(SESSION_WARNING_HEADER, HeaderValue::from_static(kind.as_str()));
            Ok(response)
        }
        Err(RefreshError::Failed(kind)) => {
            let callback = sanitize_callback(query.callback_url.as_deref())
                .unwrap_or_else(|| state.settings.landing_page.clone());
            let redirect = auth_redirect_url(
                &state.settings.auth_page,
                RedirectReason::SessionExpired,
                &callback,
            );
            let response = (
                StatusCode::UNAUTHORIZED,
                Json(ExpiredResponse {
                    error: kind,
                    redirect,
                }),
            )
                .into_response();
            Ok(state.janitor.purge_response(response))
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct SessionInfo {
    session_id: String,
    user_id: String,
    access_token_expires_at: Option<i64>,
    has_refresh_token: bool,
    error: Option<ErrorKind>,
    refresh_needed: bool,
}

/// Current session state for client-side code.
pub(super) async fn session_info(
    State(state): State<AuthState>,
    headers: HeaderMap,
) -> Result<Json<SessionInfo>, ApiError> {
    let session = state
        .resolve_session(&headers)
        .ok_or_else(|| ApiError::unauthorized(RedirectReason::NotAuthenticated.as_str()))?;

    if session.is_terminal() {
        return Err(ApiError::unauthorized(RedirectReason::SessionExpired.as_str()));
    }

    let now = now_millis();
    Ok(Json(SessionInfo {
        refresh_needed: needs_refresh(&session, now),
        access_token_expires_at: session.access_token_expires_at(),
        has_refresh_token: session.refresh_token.is_some(),
        error: session.error_state,
        session_id: session.session_id,
        user_id: session.user_id,
    }))
}

#[derive(Serialize)]
struct SuccessResponse {
    success: bool,
}

/// Remove the session record (if any) and purge every cookie variant.
fn end_session(state: &AuthState, headers: &HeaderMap, reason: &'static str) -> Response {
    if let Some(claims) = state.session_claims(headers) {
        if state.destroy_session(&claims.sid) {
            info!(session_id = %claims.sid, user_id = %claims.sub, reason, "Session ended");
        }
    }
    let response = Json(SuccessResponse { success: true }).into_response();
    state.janitor.purge_response(response)
}

/// End the current session.
pub(super) async fn logout(State(state): State<AuthState>, headers: HeaderMap) -> Response {
    end_session(&state, &headers, "logout")
}

/// Clear all session cookies, whatever state they are in.
pub(super) async fn clear_session(State(state): State<AuthState>, headers: HeaderMap) -> Response {
    end_session(&state, &headers, "clear-session")
}
