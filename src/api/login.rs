//! Sign-in and sign-up endpoints.
//!
//! - POST `/signin` - Forward credentials to the backend login endpoint
//! - POST `/signup` - Forward registration to the backend register endpoint
//!
//! Both create a session from the issued token pair and set the signed
//! session cookie.

use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, header::SET_COOKIE},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use super::error::{ApiError, ResultExt, sanitize_callback};
use super::session::CallbackQuery;
use crate::auth::{AuthState, session_cookie};
use crate::session::{IssueKind, Session, now_millis};

#[derive(Serialize)]
struct IssuedResponse {
    redirect: String,
}

pub(super) async fn signin(
    State(state): State<AuthState>,
    Query(query): Query<CallbackQuery>,
    headers: HeaderMap,
    Json(credentials): Json<serde_json::Value>,
) -> Result<Response, ApiError> {
    issue_session(&state, IssueKind::Login, query, &headers, &credentials).await
}

pub(super) async fn signup(
    State(state): State<AuthState>,
    Query(query): Query<CallbackQuery>,
    headers: HeaderMap,
    Json(credentials): Json<serde_json::Value>,
) -> Result<Response, ApiError> {
    issue_session(&state, IssueKind::Register, query, &headers, &credentials).await
}

async fn issue_session(
    state: &AuthState,
    kind: IssueKind,
    query: CallbackQuery,
    headers: &HeaderMap,
    credentials: &serde_json::Value,
) -> Result<Response, ApiError> {
    if !credentials.is_object() {
        return Err(ApiError::bad_request("Expected a JSON object"));
    }

    let issued = state.upstream.issue(kind, credentials).await?;

    // A new sign-in replaces whatever session the browser held.
    if let Some(previous) = state.session_claims(headers) {
        state.destroy_session(&previous.sid);
    }

    let session_id = Uuid::new_v4().to_string();
    let session = Session::issue(
        session_id.clone(),
        issued.user_id,
        issued.tokens,
        now_millis(),
        state.settings.session_ttl,
    );

    let artifact = state
        .jwt
        .issue_session_token(&session)
        .internal_err("Failed to sign session")?;

    let cookie = session_cookie(
        &state.settings.session_cookie,
        &artifact.token,
        artifact.duration,
        state.settings.production,
    );
    let cookie = HeaderValue::from_str(&cookie).internal_err("Failed to build session cookie")?;

    info!(
        session_id = %session_id,
        user_id = %session.user_id,
        kind = ?kind,
        "Session created"
    );
    state.store.write(&session_id, session);

    let redirect = sanitize_callback(query.callback_url.as_deref())
        .unwrap_or_else(|| state.settings.landing_page.clone());

    let mut response = Json(IssuedResponse { redirect }).into_response();
    response.headers_mut().append(SET_COOKIE, cookie);
    Ok(response)
}
