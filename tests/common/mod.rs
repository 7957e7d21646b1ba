#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    body::Body,
    extract::ConnectInfo,
    http::{Method, Request, Response, header},
    routing::get,
};
use futures::future::BoxFuture;
use serde_json::json;
use sessiongate::{
    ServerConfig,
    auth::{CurrentSession, OptionalSession},
    create_app,
    jwt::JwtConfig,
    session::{
        AuthUpstream, ErrorKind, IssueKind, IssuedSession, MemoryTokenStore, RefreshFailure,
        Session, TokenResponse, TokenStore, UpstreamError, now_millis,
    },
};

pub const SECRET: &[u8] = b"integration-test-session-secret-0123456789";

/// What the fake backend answers to refresh calls.
#[derive(Clone)]
pub enum RefreshScript {
    /// New token pair numbered by call count.
    Rotate,
    Fail(RefreshFailure),
}

/// In-process token backend that counts calls.
pub struct FakeUpstream {
    refresh_calls: AtomicUsize,
    issue_calls: AtomicUsize,
    script: Mutex<RefreshScript>,
    delay: Duration,
}

impl FakeUpstream {
    pub fn new(script: RefreshScript) -> Arc<Self> {
        Self::with_delay(script, Duration::ZERO)
    }

    pub fn with_delay(script: RefreshScript, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            refresh_calls: AtomicUsize::new(0),
            issue_calls: AtomicUsize::new(0),
            script: Mutex::new(script),
            delay,
        })
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn issue_calls(&self) -> usize {
        self.issue_calls.load(Ordering::SeqCst)
    }

    pub fn set_script(&self, script: RefreshScript) {
        *self.script.lock().unwrap() = script;
    }
}

impl AuthUpstream for FakeUpstream {
    fn refresh<'a>(
        &'a self,
        _refresh_token: &'a str,
    ) -> BoxFuture<'a, Result<TokenResponse, RefreshFailure>> {
        Box::pin(async move {
            let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let script = self.script.lock().unwrap().clone();
            match script {
                RefreshScript::Rotate => Ok(TokenResponse {
                    access_token: format!("access-{n}"),
                    refresh_token: Some(format!("refresh-{n}")),
                    expires_in: 900,
                }),
                RefreshScript::Fail(failure) => Err(failure),
            }
        })
    }

    fn issue<'a>(
        &'a self,
        _kind: IssueKind,
        credentials: &'a serde_json::Value,
    ) -> BoxFuture<'a, Result<IssuedSession, UpstreamError>> {
        Box::pin(async move {
            self.issue_calls.fetch_add(1, Ordering::SeqCst);
            if credentials["password"] == "wrong" {
                return Err(UpstreamError::Rejected {
                    status: 401,
                    detail: Some("Invalid credentials".into()),
                });
            }
            if credentials["password"] == "backend-down" {
                return Err(UpstreamError::Unavailable("connection refused".into()));
            }
            let user_id = credentials["username"].as_str().unwrap_or("anonymous");
            Ok(IssuedSession {
                user_id: user_id.to_string(),
                tokens: TokenResponse {
                    access_token: "issued-access".into(),
                    refresh_token: Some("issued-refresh".into()),
                    expires_in: 900,
                },
            })
        })
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryTokenStore>,
    pub upstream: Arc<FakeUpstream>,
    pub jwt: JwtConfig,
}

/// Collaborator routes behind the gate.
fn application_routes() -> Router {
    Router::new()
        .route("/dashboard", get(|| async { "dashboard" }))
        .route(
            "/api/me",
            get(|CurrentSession(session): CurrentSession| async move {
                Json(json!({ "userId": session.user_id }))
            }),
        )
        .route(
            "/public/info",
            get(|OptionalSession(session): OptionalSession| async move {
                Json(json!({ "authenticated": session.is_some() }))
            }),
        )
}

pub fn test_config(upstream: Arc<FakeUpstream>, store: Arc<MemoryTokenStore>) -> ServerConfig {
    let mut config = ServerConfig::new(SECRET.to_vec(), upstream);
    config.store = store as Arc<dyn TokenStore>;
    config
}

pub fn test_app(upstream: Arc<FakeUpstream>) -> TestApp {
    test_app_with(upstream, |_| {})
}

pub fn test_app_with(
    upstream: Arc<FakeUpstream>,
    configure: impl FnOnce(&mut ServerConfig),
) -> TestApp {
    let store = Arc::new(MemoryTokenStore::new());
    let mut config = test_config(upstream.clone(), store.clone());
    configure(&mut config);
    TestApp {
        router: create_app(&config, application_routes()),
        store,
        upstream,
        jwt: JwtConfig::new(SECRET),
    }
}

impl TestApp {
    /// Store a session whose access token expires `expires_in_ms` from now and
    /// return the matching Cookie header.
    pub fn seed_session(
        &self,
        session_id: &str,
        expires_in_ms: i64,
        refresh_token: Option<&str>,
        error_state: Option<ErrorKind>,
    ) -> String {
        let now = now_millis();
        let mut session = Session::issue(
            session_id,
            "user-1",
            TokenResponse {
                access_token: "access-0".into(),
                refresh_token: refresh_token.map(str::to_string),
                expires_in: 60,
            },
            now,
            Duration::from_secs(3600),
        );
        if let Some(token) = session.access_token.as_mut() {
            token.expires_at = now + expires_in_ms;
        }
        if let Some(kind) = error_state {
            session.record_failure(kind);
        }
        let artifact = self.jwt.issue_session_token(&session).unwrap();
        self.store.write(session_id, session);
        format!("session_token={}", artifact.token)
    }

    pub fn session(&self, session_id: &str) -> Option<Session> {
        self.store.read(session_id)
    }
}

/// Build a request with a socket address so per-IP rate limiting applies.
pub fn request(method: Method, uri: &str, cookie: Option<&str>) -> Request<Body> {
    request_with_body(method, uri, cookie, Body::empty())
}

pub fn json_request(
    method: Method,
    uri: &str,
    cookie: Option<&str>,
    body: serde_json::Value,
) -> Request<Body> {
    let mut req = request_with_body(method, uri, cookie, Body::from(body.to_string()));
    req.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    req
}

fn request_with_body(
    method: Method,
    uri: &str,
    cookie: Option<&str>,
    body: Body,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    let mut req = builder.body(body).unwrap();
    req.extensions_mut()
        .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))));
    req
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

pub fn location(response: &Response<Body>) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .expect("Location header")
        .to_str()
        .unwrap()
        .to_string()
}

/// Query parameters of a redirect target, decoded.
pub fn redirect_params(target: &str) -> (String, Vec<(String, String)>) {
    let url = url::Url::parse(&format!("http://localhost{target}")).unwrap();
    let params = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    (url.path().to_string(), params)
}
