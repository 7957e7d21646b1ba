mod error;
mod login;
mod session;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use std::sync::Arc;

use crate::auth::AuthState;
use crate::rate_limit::{RateLimitConfig, rate_limit_issue, rate_limit_refresh};

pub use error::{ApiError, sanitize_callback};

/// Create the auth router, mounted under `/auth`.
pub fn create_auth_router(state: AuthState, limits: Arc<RateLimitConfig>) -> Router {
    let session_router = Router::new()
        .route("/session", get(session::session_info))
        .route("/logout", post(session::logout))
        .route("/clear-session", post(session::clear_session))
        .with_state(state.clone());

    let refresh_router = Router::new()
        .route("/refresh", post(session::refresh))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            limits.clone(),
            rate_limit_refresh,
        ));

    let issue_router = Router::new()
        .route("/signin", post(login::signin))
        .route("/signup", post(login::signup))
        .with_state(state)
        .layer(middleware::from_fn_with_state(limits, rate_limit_issue));

    Router::new()
        .merge(session_router)
        .merge(refresh_router)
        .merge(issue_router)
}
