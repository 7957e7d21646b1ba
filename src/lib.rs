pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod csp;
pub mod jwt;
pub mod rate_limit;
pub mod session;

use api::create_auth_router;
use auth::{
    AuthSettings, AuthState, CookieJanitor, IpExtractor, PathRules, SESSION_COOKIE_NAME,
    SESSION_COOKIE_NAMES, session_gate,
};
use axum::{Json, Router, middleware, routing::get};
use jwt::JwtConfig;
use rate_limit::RateLimitConfig;
use serde_json::json;
use session::{AuthUpstream, MemoryTokenStore, REFRESH_COOLDOWN, RefreshCoordinator, TokenStore};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Default lifetime of the signed session artifact (30 days).
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

pub struct ServerConfig {
    /// Secret for signing session artifacts
    pub session_secret: Vec<u8>,
    /// Token backend (refresh, login, register)
    pub upstream: Arc<dyn AuthUpstream>,
    /// Token material storage
    pub store: Arc<dyn TokenStore>,
    /// Where unauthenticated requests are redirected
    pub auth_page: String,
    /// Where authenticated visitors of an auth page are redirected
    pub landing_page: String,
    /// Paths classified as auth pages (exact or directory prefix)
    pub auth_pages: Vec<String>,
    /// Public path rules (trailing `/` for a prefix, otherwise exact)
    pub public_paths: Vec<String>,
    /// Name of the cookie carrying the session artifact
    pub session_cookie: String,
    /// Every cookie name cleared when a session ends
    pub cookie_names: Vec<String>,
    /// Root domain for clearing subdomain-scoped cookies
    pub cookie_domain: Option<String>,
    /// Secure cookies and the restrictive CSP
    pub production: bool,
    pub session_ttl: Duration,
    /// Upstream refresh timeout, clamped to the refresh cooldown
    pub refresh_timeout: Duration,
    /// IP extraction strategy (requires running behind a proxy)
    pub ip_extractor: Option<IpExtractor>,
}

impl ServerConfig {
    /// Configuration with the default paths and cookie names.
    pub fn new(session_secret: Vec<u8>, upstream: Arc<dyn AuthUpstream>) -> Self {
        let auth_page = "/auth/login".to_string();
        Self {
            session_secret,
            upstream,
            store: Arc::new(MemoryTokenStore::new()),
            auth_pages: vec![auth_page.clone(), "/auth/register".to_string()],
            auth_page,
            landing_page: "/dashboard".to_string(),
            public_paths: default_public_paths(),
            session_cookie: SESSION_COOKIE_NAME.to_string(),
            cookie_names: SESSION_COOKIE_NAMES.iter().map(|n| n.to_string()).collect(),
            cookie_domain: None,
            production: false,
            session_ttl: DEFAULT_SESSION_TTL,
            refresh_timeout: REFRESH_COOLDOWN,
            ip_extractor: None,
        }
    }
}

pub fn default_public_paths() -> Vec<String> {
    ["/", "/health", "/auth/", "/public/", "/favicon.ico"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Build the gate and endpoint state from the configuration.
pub fn build_state(config: &ServerConfig) -> AuthState {
    let coordinator = RefreshCoordinator::new(config.store.clone(), config.upstream.clone())
        .with_timeout(config.refresh_timeout);

    let mut cookie_names = config.cookie_names.clone();
    if !cookie_names.contains(&config.session_cookie) {
        cookie_names.push(config.session_cookie.clone());
    }

    AuthState {
        jwt: Arc::new(JwtConfig::new(&config.session_secret)),
        store: config.store.clone(),
        coordinator: Arc::new(coordinator),
        upstream: config.upstream.clone(),
        janitor: Arc::new(CookieJanitor::new(cookie_names, config.cookie_domain.clone())),
        settings: Arc::new(AuthSettings {
            auth_page: config.auth_page.clone(),
            landing_page: config.landing_page.clone(),
            paths: PathRules::new(config.auth_pages.clone(), config.public_paths.clone()),
            session_cookie: config.session_cookie.clone(),
            production: config.production,
            session_ttl: config.session_ttl,
        }),
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

fn assemble(state: AuthState, limits: Arc<RateLimitConfig>, app: Router) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/auth", create_auth_router(state.clone(), limits))
        .merge(app)
        .layer(middleware::from_fn_with_state(state, session_gate))
}

/// Create the router: auth endpoints, `/health` and the application routes,
/// all behind the session gate.
pub fn create_app(config: &ServerConfig, app: Router) -> Router {
    let limits = Arc::new(RateLimitConfig::new(config.ip_extractor.clone()));
    assemble(build_state(config), limits, app)
}

/// Run cleanup tasks once and spawn the background scheduler.
pub fn init_cleanup(
    state: &AuthState,
    limits: Option<Arc<RateLimitConfig>>,
) -> tokio::task::JoinHandle<()> {
    cleanup::run_cleanup(&*state.store, &state.coordinator);
    cleanup::spawn_cleanup_scheduler(state.store.clone(), state.coordinator.clone(), limits)
}

/// Run the server on the given listener. This function blocks until the server exits.
pub async fn run_server(
    config: ServerConfig,
    app: Router,
    listener: TcpListener,
) -> Result<(), std::io::Error> {
    let state = build_state(&config);
    let limits = Arc::new(RateLimitConfig::new(config.ip_extractor.clone()));
    let cleanup_task = init_cleanup(&state, Some(limits.clone()));

    let make_service =
        assemble(state, limits, app).into_make_service_with_connect_info::<SocketAddr>();
    let result = axum::serve(listener, make_service).await;
    cleanup_task.abort();
    result
}

/// Start the server on the given port in a background task. Use port 0 to let
/// the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    app: Router,
    port: u16,
) -> std::io::Result<(tokio::task::JoinHandle<()>, SocketAddr)> {
    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = run_server(config, app, listener).await {
            tracing::error!(error = %e, "Server exited with error");
        }
    });

    Ok((handle, local_addr))
}
