//! Tests for the session gate.
//!
//! Tests cover:
//! - Redirects for protected paths without a session or with an unrecoverable one
//! - Warning and refresh-needed markers
//! - Auth page redirect to the landing page
//! - Public paths with destroyed sessions
//! - Baseline security headers

mod common;

use axum::http::{Method, StatusCode, header};
use common::{
    FakeUpstream, RefreshScript, body_json, location, redirect_params, request, set_cookies,
    test_app, test_app_with,
};
use sessiongate::auth::{CookieJanitor, SESSION_COOKIE_NAMES};
use sessiongate::session::ErrorKind;
use tower::ServiceExt;

const MINUTE: i64 = 60_000;

#[tokio::test]
async fn test_protected_path_without_session_redirects() {
    let app = test_app(FakeUpstream::new(RefreshScript::Rotate));

    let response = app
        .router
        .oneshot(request(Method::GET, "/dashboard", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let (path, params) = redirect_params(&location(&response));
    assert_eq!(path, "/auth/login");
    assert!(params.contains(&("error".into(), "not_authenticated".into())));
    assert!(params.contains(&("callbackUrl".into(), "/dashboard".into())));
    assert!(set_cookies(&response).is_empty());
}

#[tokio::test]
async fn test_callback_keeps_query_string() {
    let app = test_app(FakeUpstream::new(RefreshScript::Rotate));

    let response = app
        .router
        .oneshot(request(Method::GET, "/dashboard?tab=billing", None))
        .await
        .unwrap();

    let (_, params) = redirect_params(&location(&response));
    assert!(params.contains(&("callbackUrl".into(), "/dashboard?tab=billing".into())));
}

#[tokio::test]
async fn test_tampered_artifact_is_treated_as_absent() {
    let app = test_app(FakeUpstream::new(RefreshScript::Rotate));
    let cookie = app.seed_session("sid", 30 * MINUTE, Some("r"), None);
    let tampered = format!("{cookie}x");

    let response = app
        .router
        .oneshot(request(Method::GET, "/dashboard", Some(&tampered)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let (_, params) = redirect_params(&location(&response));
    assert!(params.contains(&("error".into(), "not_authenticated".into())));
}

#[tokio::test]
async fn test_valid_session_reaches_protected_path() {
    let app = test_app(FakeUpstream::new(RefreshScript::Rotate));
    let cookie = app.seed_session("sid", 30 * MINUTE, Some("r"), None);

    let response = app
        .router
        .oneshot(request(Method::GET, "/api/me", Some(&cookie)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("x-refresh-needed").is_none());
    assert!(response.headers().get("x-session-warning").is_none());
    let body = body_json(response).await;
    assert_eq!(body["userId"], "user-1");
}

/// No refresh token, recoverable, request proceeds with a warning.
#[tokio::test]
async fn test_recoverable_error_proceeds_with_warning() {
    let app = test_app(FakeUpstream::new(RefreshScript::Rotate));
    let cookie = app.seed_session("sid", 30 * MINUTE, None, None);

    let response = app
        .router
        .clone()
        .oneshot(request(Method::POST, "/auth/refresh", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-session-warning").unwrap(),
        "NoRefreshToken"
    );
    let body = body_json(response).await;
    assert_eq!(body["error"], "NoRefreshToken");
    assert_eq!(body["recoverable"], true);
    assert_eq!(app.upstream.refresh_calls(), 0);

    let response = app
        .router
        .oneshot(request(Method::GET, "/dashboard", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-session-warning").unwrap(),
        "NoRefreshToken"
    );
}

/// Four minutes left is refresh-needed, six is not.
#[tokio::test]
async fn test_refresh_needed_marker() {
    let app = test_app(FakeUpstream::new(RefreshScript::Rotate));
    let soon = app.seed_session("soon", 4 * MINUTE, Some("r"), None);
    let later = app.seed_session("later", 6 * MINUTE, Some("r"), None);

    let response = app
        .router
        .clone()
        .oneshot(request(Method::GET, "/dashboard", Some(&soon)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("x-refresh-needed").unwrap(), "true");

    let response = app
        .router
        .oneshot(request(Method::GET, "/dashboard", Some(&later)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("x-refresh-needed").is_none());
}

#[tokio::test]
async fn test_expired_access_token_gets_no_marker() {
    let app = test_app(FakeUpstream::new(RefreshScript::Rotate));
    let cookie = app.seed_session("sid", -MINUTE, Some("r"), None);

    let response = app
        .router
        .oneshot(request(Method::GET, "/dashboard", Some(&cookie)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("x-refresh-needed").is_none());
}

/// Authenticated user on the login page goes to the landing page.
#[tokio::test]
async fn test_auth_page_redirects_authenticated_user() {
    let app = test_app(FakeUpstream::new(RefreshScript::Rotate));
    let cookie = app.seed_session("sid", 30 * MINUTE, Some("r"), None);

    let response = app
        .router
        .oneshot(request(Method::GET, "/auth/login", Some(&cookie)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "/dashboard");
}

#[tokio::test]
async fn test_auth_page_without_session_is_not_redirected() {
    let app = test_app(FakeUpstream::new(RefreshScript::Rotate));

    let response = app
        .router
        .oneshot(request(Method::GET, "/auth/login", None))
        .await
        .unwrap();

    // No login page is mounted here; the gate lets the request through.
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unrecoverable_session_on_protected_path_is_destroyed() {
    let app = test_app(FakeUpstream::new(RefreshScript::Rotate));
    let cookie = app.seed_session(
        "sid",
        30 * MINUTE,
        Some("r"),
        Some(ErrorKind::RefreshTokenExpired),
    );

    let response = app
        .router
        .clone()
        .oneshot(request(Method::GET, "/dashboard", Some(&cookie)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        location(&response),
        "/auth/login?error=session_expired&callbackUrl=%2Fdashboard"
    );

    let janitor = CookieJanitor::new(SESSION_COOKIE_NAMES, None);
    assert_eq!(set_cookies(&response), janitor.variants());
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-store, no-cache, must-revalidate, max-age=0"
    );
    assert!(app.session("sid").is_none());
}

#[tokio::test]
async fn test_unrecoverable_session_on_public_path_is_anonymous() {
    let app = test_app(FakeUpstream::new(RefreshScript::Rotate));
    let cookie = app.seed_session(
        "sid",
        30 * MINUTE,
        Some("r"),
        Some(ErrorKind::ReuseDetected),
    );

    let response = app
        .router
        .clone()
        .oneshot(request(Method::GET, "/public/info", Some(&cookie)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookies(&response).is_empty());
    let body = body_json(response).await;
    assert_eq!(body["authenticated"], false);
    assert!(app.session("sid").is_some());
}

#[tokio::test]
async fn test_security_headers_on_every_response() {
    let app = test_app_with(FakeUpstream::new(RefreshScript::Rotate), |config| {
        config.production = true;
    });

    for uri in ["/health", "/dashboard"] {
        let response = app
            .router
            .clone()
            .oneshot(request(Method::GET, uri, None))
            .await
            .unwrap();

        let headers = response.headers();
        assert_eq!(headers.get(header::X_CONTENT_TYPE_OPTIONS).unwrap(), "nosniff");
        assert_eq!(headers.get(header::X_FRAME_OPTIONS).unwrap(), "DENY");
        assert_eq!(
            headers.get(header::REFERRER_POLICY).unwrap(),
            "strict-origin-when-cross-origin"
        );
        assert!(
            headers
                .get(header::CONTENT_SECURITY_POLICY)
                .unwrap()
                .to_str()
                .unwrap()
                .contains("frame-ancestors 'none'")
        );
    }
}

#[tokio::test]
async fn test_development_mode_has_no_csp() {
    let app = test_app(FakeUpstream::new(RefreshScript::Rotate));

    let response = app
        .router
        .oneshot(request(Method::GET, "/health", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::CONTENT_SECURITY_POLICY).is_none());
    assert_eq!(
        response.headers().get(header::X_CONTENT_TYPE_OPTIONS).unwrap(),
        "nosniff"
    );
}

#[tokio::test]
async fn test_custom_public_paths() {
    let app = test_app_with(FakeUpstream::new(RefreshScript::Rotate), |config| {
        config.public_paths.push("/docs/".into());
    });

    let response = app
        .router
        .clone()
        .oneshot(request(Method::GET, "/docs/intro", None))
        .await
        .unwrap();
    // Public, so no redirect; nothing is mounted there.
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .router
        .oneshot(request(Method::GET, "/docs", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
}
